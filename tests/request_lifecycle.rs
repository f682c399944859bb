mod common;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn request_is_assigned_submitted_and_approved() -> Result<()> {
    let t = common::setup().await?;

    let hr = t.register("Hana HR", "hr@example.com", None).await?;
    let alice = t.register("Alice", "alice@example.com", Some("Engineering")).await?;
    let bob = t.register("Bob", "bob@example.com", Some("Engineering")).await?;
    let carol = t.register("Carol", "carol@example.com", Some("Sales")).await?;
    t.set_role("hr@example.com", "HR", None, None).await?;

    // employees cannot open requests
    let (status, _) = t
        .send("POST", "/requests", Some(&alice.token), Some(json!({ "title": "x", "document_type": "ID_CARD" })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request_id = t.create_request(&hr.token, "Proof of address", Some("Engineering")).await?;

    let (status, detail) = t.send("GET", &format!("/requests/{}", request_id), Some(&hr.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["status"], "OPEN");
    assert_eq!(detail["assigned_to_id"], hr.id.as_str(), "HR creator becomes the processor");

    // department assignment expands to every active member
    let (status, body) = t
        .send(
            "POST",
            &format!("/requests/{}/assignments", request_id),
            Some(&hr.token),
            Some(json!({ "department": "Engineering" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["created"].as_array().map(Vec::len), Some(2));

    // re-assigning an existing target is skipped, not duplicated
    let (status, body) = t
        .send(
            "POST",
            &format!("/requests/{}/assignments", request_id),
            Some(&hr.token),
            Some(json!({ "employee_ids": [alice.id, carol.id] })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["created"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["skipped"], json!([alice.id]));

    // an empty department is rejected
    let (status, _) = t
        .send(
            "POST",
            &format!("/requests/{}/assignments", request_id),
            Some(&hr.token),
            Some(json!({ "department": "Nowhere" })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // the target sees the request and its own assignment
    let (status, list) = t.send("GET", "/requests", Some(&alice.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(list.as_array().context("list")?.iter().any(|r| r["id"] == request_id.as_str()));

    let (status, detail) = t.send("GET", &format!("/requests/{}", request_id), Some(&alice.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let assignment_id = detail["assignments"]
        .as_array()
        .context("assignments")?
        .iter()
        .find(|a| a["employee_id"] == alice.id.as_str())
        .and_then(|a| a["id"].as_str())
        .context("alice has no assignment")?
        .to_string();

    // nothing to review yet
    let review_uri = format!("/assignments/{}/review", assignment_id);
    let (status, _) = t.send("POST", &review_uri, Some(&hr.token), Some(json!({ "decision": "APPROVE" }))).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, attachment) = t.upload(&alice.token, &assignment_id, "utility-bill.pdf").await?;
    assert_eq!(status, StatusCode::CREATED, "{}", attachment);
    assert_eq!(attachment["uploaded_by_id"], alice.id.as_str());

    let (status, assignment) = t.send("GET", &format!("/assignments/{}", assignment_id), Some(&alice.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assignment["status"], "SUBMITTED");

    // another target of the same request cannot touch alice's assignment
    let (status, _) = t.upload(&bob.token, &assignment_id, "bob.pdf").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // employees cannot review
    let (status, _) = t.send("POST", &review_uri, Some(&alice.token), Some(json!({ "decision": "APPROVE" }))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, reviewed) = t
        .send("POST", &review_uri, Some(&hr.token), Some(json!({ "decision": "APPROVE", "note": "  looks good " })))
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", reviewed);
    assert_eq!(reviewed["status"], "APPROVED");
    assert_eq!(reviewed["review_note"], "looks good");
    assert_eq!(reviewed["reviewed_by_id"], hr.id.as_str());

    // approved assignments are frozen
    let (status, _) = t.upload(&alice.token, &assignment_id, "late.pdf").await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, attachments) = t
        .send("GET", &format!("/assignments/{}/attachments", assignment_id), Some(&hr.token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(attachments.as_array().map(Vec::len), Some(1));

    let attachment_id = attachment["id"].as_str().context("attachment id")?;
    let (status, downloaded) = t.send("GET", &format!("/attachments/{}", attachment_id), Some(&hr.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(downloaded["storage_key"], "uploads/utility-bill.pdf");

    let logs = t.wait_for_event("assignment.approved").await?;
    assert_eq!(logs[0].1, "Submission approved");

    Ok(())
}

#[tokio::test]
async fn rejected_assignment_accepts_a_new_upload() -> Result<()> {
    let t = common::setup().await?;

    let hr = t.register("Hana HR", "hr@example.com", None).await?;
    let alice = t.register("Alice", "alice@example.com", Some("Engineering")).await?;
    t.set_role("hr@example.com", "HR", None, None).await?;

    let request_id = t.create_request(&hr.token, "Passport copy", None).await?;
    let assignment_id = t.assign(&hr.token, &request_id, &[alice.id.as_str()]).await?.remove(0);

    let (status, _) = t.upload(&alice.token, &assignment_id, "blurry.pdf").await?;
    assert_eq!(status, StatusCode::CREATED);

    let review_uri = format!("/assignments/{}/review", assignment_id);
    let (status, reviewed) = t
        .send("POST", &review_uri, Some(&hr.token), Some(json!({ "decision": "REJECT", "note": "unreadable" })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviewed["status"], "REJECTED");

    let (status, _) = t.upload(&alice.token, &assignment_id, "sharp.pdf").await?;
    assert_eq!(status, StatusCode::CREATED);

    let (_, assignment) = t.send("GET", &format!("/assignments/{}", assignment_id), Some(&alice.token), None).await?;
    assert_eq!(assignment["status"], "SUBMITTED");

    // closing the request blocks further assignments
    let (status, closed) = t
        .send("PUT", &format!("/requests/{}", request_id), Some(&hr.token), Some(json!({ "status": "CLOSED" })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["status"], "CLOSED");

    let bob = t.register("Bob", "bob@example.com", Some("Engineering")).await?;
    let (status, _) = t
        .send(
            "POST",
            &format!("/requests/{}/assignments", request_id),
            Some(&hr.token),
            Some(json!({ "employee_ids": [bob.id] })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn activity_is_hash_chained() -> Result<()> {
    let t = common::setup().await?;

    let hr = t.register("Hana HR", "hr@example.com", None).await?;
    t.set_role("hr@example.com", "HR", None, None).await?;
    let request_id = t.create_request(&hr.token, "Tax form", None).await?;

    let (status, _) = t
        .send("PUT", &format!("/requests/{}", request_id), Some(&hr.token), Some(json!({ "title": "Tax form 2026" })))
        .await?;
    assert_eq!(status, StatusCode::OK);

    t.wait_for_event("request.updated").await?;
    // the chained copy is written right after the activity row
    for _ in 0..25 {
        let stored: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM event_store WHERE event_name = 'request.updated'")
            .fetch_one(&t.pool)
            .await?;
        if stored > 0 {
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    let rows: Vec<(Option<String>, String)> = sqlx::query_as("SELECT prev_hash, hash FROM event_store ORDER BY rowid")
        .fetch_all(&t.pool)
        .await?;
    assert!(rows.len() >= 3, "expected register, create and update events, got {}", rows.len());
    assert!(rows[0].0.is_none());
    for pair in rows.windows(2) {
        assert_eq!(pair[1].0.as_deref(), Some(pair[0].1.as_str()));
    }

    Ok(())
}

#[tokio::test]
async fn upload_cannot_reopen_an_approved_assignment() -> Result<()> {
    let t = common::setup().await?;

    let hr = t.register("Hana HR", "hr@example.com", None).await?;
    let alice = t.register("Alice", "alice@example.com", None).await?;
    t.set_role("hr@example.com", "HR", None, None).await?;

    let request_id = t.create_request(&hr.token, "Signed contract", None).await?;
    let assignment_id = t.assign(&hr.token, &request_id, &[alice.id.as_str()]).await?.remove(0);

    // approved behind the upload's back
    let id = uuid::Uuid::parse_str(&assignment_id)?;
    sqlx::query("UPDATE assignments SET status = 'APPROVED' WHERE id = ?")
        .bind(id)
        .execute(&t.pool)
        .await?;

    let (status, _) = t.upload(&alice.token, &assignment_id, "contract.pdf").await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (stored_status, attachments): (String, i64) = sqlx::query_as(
        "SELECT status, (SELECT COUNT(1) FROM attachments WHERE assignment_id = assignments.id) FROM assignments WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&t.pool)
    .await?;
    assert_eq!(stored_status, "APPROVED");
    assert_eq!(attachments, 0);

    Ok(())
}

#[tokio::test]
async fn closed_request_rejects_uploads_but_allows_review() -> Result<()> {
    let t = common::setup().await?;

    let hr = t.register("Hana HR", "hr@example.com", None).await?;
    let alice = t.register("Alice", "alice@example.com", None).await?;
    let bob = t.register("Bob", "bob@example.com", None).await?;
    t.set_role("hr@example.com", "HR", None, None).await?;

    let request_id = t.create_request(&hr.token, "Bank details", None).await?;
    let ids = t.assign(&hr.token, &request_id, &[alice.id.as_str(), bob.id.as_str()]).await?;

    let (status, _) = t.upload(&alice.token, &ids[0], "iban.pdf").await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = t
        .send("PUT", &format!("/requests/{}", request_id), Some(&hr.token), Some(json!({ "status": "CLOSED" })))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.upload(&bob.token, &ids[1], "late.pdf").await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // submissions made before closing can still be settled
    let (status, reviewed) = t
        .send("POST", &format!("/assignments/{}/review", ids[0]), Some(&hr.token), Some(json!({ "decision": "APPROVE" })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviewed["status"], "APPROVED");

    Ok(())
}

#[tokio::test]
async fn overlapping_assignment_calls_skip_duplicates() -> Result<()> {
    let t = common::setup().await?;

    let hr = t.register("Hana HR", "hr@example.com", None).await?;
    let alice = t.register("Alice", "alice@example.com", None).await?;
    t.set_role("hr@example.com", "HR", None, None).await?;

    let request_id = t.create_request(&hr.token, "Medical certificate", None).await?;
    let uri = format!("/requests/{}/assignments", request_id);
    let body = json!({ "employee_ids": [alice.id] });

    let (first, second) = tokio::join!(
        t.send("POST", &uri, Some(&hr.token), Some(body.clone())),
        t.send("POST", &uri, Some(&hr.token), Some(body.clone())),
    );
    let (first, second) = (first?, second?);
    assert_eq!(first.0, StatusCode::CREATED, "{}", first.1);
    assert_eq!(second.0, StatusCode::CREATED, "{}", second.1);

    let created: usize = [&first.1, &second.1]
        .iter()
        .map(|b| b["created"].as_array().map(Vec::len).unwrap_or(0))
        .sum();
    let skipped: usize = [&first.1, &second.1]
        .iter()
        .map(|b| b["skipped"].as_array().map(Vec::len).unwrap_or(0))
        .sum();
    assert_eq!((created, skipped), (1, 1));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM assignments").fetch_one(&t.pool).await?;
    assert_eq!(rows, 1);

    Ok(())
}
