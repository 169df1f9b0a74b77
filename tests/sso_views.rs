mod support;

#[test]
fn saml_metadata_not_found_when_unconfigured() {
    let _env = support::TestEnv::new();
    let gateway = campus_hub_lib::test_support::TestGateway::start().expect("start gateway");

    let probe = gateway.get("/auth/saml/metadata.xml").expect("probe");
    assert_eq!(probe.status, 404);
}

#[test]
fn saml_metadata_not_found_when_disabled() {
    let _env = support::TestEnv::new();
    let gateway = campus_hub_lib::test_support::TestGateway::start().expect("start gateway");

    gateway
        .update_saml(false, "http://campus.test/saml/sp", "")
        .expect("configure saml");

    let probe = gateway.get("/auth/saml/metadata.xml").expect("probe");
    assert_eq!(probe.status, 404);
}

#[test]
fn saml_metadata_returns_xml_when_enabled() {
    let _env = support::TestEnv::new();
    let gateway = campus_hub_lib::test_support::TestGateway::start().expect("start gateway");

    gateway
        .update_saml(true, "http://campus.test/saml/sp", "")
        .expect("configure saml");

    let probe = gateway.get("/auth/saml/metadata.xml").expect("probe");
    assert_eq!(probe.status, 200);
    assert!(probe.content_type.starts_with("text/xml"));
    assert!(probe.body.contains("EntityDescriptor"));
    assert!(probe.body.contains(r#"entityID="http://campus.test/saml/sp""#));
    // The assertion consumer URL keeps its trailing slash.
    assert!(probe
        .body
        .contains("http://localhost:8000/auth/complete/tpa-saml/"));
}

#[test]
fn saml_metadata_generation_errors_return_joined_500() {
    let _env = support::TestEnv::new();
    let gateway = campus_hub_lib::test_support::TestGateway::start().expect("start gateway");

    // Break both the certificate and the platform root URL so the error list
    // has two entries.
    let mut settings = campus_hub_lib::test_support::settings_get_json().expect("settings");
    settings["lms_root_url"] = serde_json::json!("not a url");
    campus_hub_lib::test_support::settings_set_json(settings).expect("write settings");

    gateway
        .update_saml(true, "http://campus.test/saml/sp", "!!! not base64 !!!")
        .expect("configure saml");

    let probe = gateway.get("/auth/saml/metadata.xml").expect("probe");
    assert_eq!(probe.status, 500);
    assert!(probe.body.contains("invalid platform root URL"));
    assert!(probe.body.contains("invalid public certificate"));
    assert!(probe.body.contains(", "), "errors must be comma-joined: {}", probe.body);
}

#[test]
fn inactive_user_redirects_to_dashboard_by_default() {
    let _env = support::TestEnv::new();
    let gateway = campus_hub_lib::test_support::TestGateway::start().expect("start gateway");

    let probe = gateway.get("/auth/inactive").expect("probe");
    assert_eq!(probe.status, 302);
    assert_eq!(probe.location, "http://localhost:8000/dashboard");
}

#[test]
fn inactive_user_honors_relative_next() {
    let _env = support::TestEnv::new();
    let gateway = campus_hub_lib::test_support::TestGateway::start().expect("start gateway");

    let probe = gateway
        .get("/auth/inactive?next=/account/finish_auth/?course_id=demo")
        .expect("probe");
    assert_eq!(probe.status, 302);
    assert!(probe
        .location
        .starts_with("http://localhost:8000/account/finish_auth/"));
}

#[test]
fn inactive_user_rejects_off_origin_next() {
    let _env = support::TestEnv::new();
    let gateway = campus_hub_lib::test_support::TestGateway::start().expect("start gateway");

    let probe = gateway
        .get("/auth/inactive?next=https://evil.example.com/phish")
        .expect("probe");
    assert_eq!(probe.status, 302);
    assert_eq!(probe.location, "http://localhost:8000/dashboard");
}

#[test]
fn custom_entry_not_found_without_payload() {
    let _env = support::TestEnv::new();
    let gateway = campus_hub_lib::test_support::TestGateway::start().expect("start gateway");

    let probe = gateway.get("/auth/custom-entry").expect("probe");
    assert_eq!(probe.status, 404);

    let probe = gateway
        .get("/auth/custom-entry?tpa_entry=unknown-token")
        .expect("probe");
    assert_eq!(probe.status, 404);
}

#[test]
fn custom_entry_renders_form_once_then_is_spent() {
    let _env = support::TestEnv::new();
    let gateway = campus_hub_lib::test_support::TestGateway::start().expect("start gateway");

    let token = gateway
        .register_entry(
            "https://forms.campus.test/auth",
            serde_json::json!({"name": "Jamie Doe", "email": "jamie@example.com"}),
        )
        .expect("register payload");

    let probe = gateway
        .get(&format!("/auth/custom-entry?tpa_entry={token}"))
        .expect("probe");
    assert_eq!(probe.status, 200);
    assert!(probe.content_type.starts_with("text/html"));
    assert!(probe
        .body
        .contains(r#"action="https://forms.campus.test/auth""#));
    assert!(probe.body.contains(r#"name="data""#));
    assert!(probe.body.contains(r#"name="hmac""#));

    // The payload is popped on first render.
    let probe = gateway
        .get(&format!("/auth/custom-entry?tpa_entry={token}"))
        .expect("second probe");
    assert_eq!(probe.status, 404);
}
