use serde_json::Value;

#[test]
fn openapi_documents_request_workflow() -> anyhow::Result<()> {
    // Build the OpenAPI document the same way the server does
    let doc = drms::docs::build_openapi(8000);
    let v = serde_json::to_value(&doc)?;

    let paths = v.get("paths").and_then(Value::as_object).expect("paths must exist");
    for path in [
        "/auth/login",
        "/requests",
        "/requests/{id}",
        "/requests/{id}/assignments",
        "/assignments/{id}/attachments",
        "/assignments/{id}/review",
        "/attachments/{id}",
        "/departments",
        "/users/{id}/role",
    ] {
        assert!(paths.contains_key(path), "OpenAPI missing path '{}'", path);
    }

    let schemas = v
        .get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(Value::as_object)
        .expect("components.schemas must exist");

    let props = schemas
        .get("Attachment")
        .and_then(|t| t.get("properties"))
        .and_then(Value::as_object)
        .expect("components.schemas.Attachment.properties must exist");
    for k in ["assignment_id", "uploaded_by_id", "file_name", "storage_key"] {
        assert!(props.contains_key(k), "OpenAPI Attachment schema missing '{}'", k);
    }

    let roles = schemas
        .get("Role")
        .and_then(|r| r.get("enum"))
        .and_then(Value::as_array)
        .expect("components.schemas.Role.enum must exist");
    assert_eq!(roles.len(), 4);
    assert!(roles.iter().any(|r| r == "DEPARTMENT_HEAD"));

    assert!(v.pointer("/components/securitySchemes/bearerAuth").is_some());

    Ok(())
}
