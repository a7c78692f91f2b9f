use reqwest::StatusCode;
use serde_json::json;

use super::common::{spawn_server, Mail};

#[tokio::test]
async fn test_owner_saves_draft_and_strangers_are_refused() {
    let server = spawn_server(Mail::None).await;
    let id = server.draft("EPA", json!({ "title": "Ward round" })).await;
    let path = format!("/evidence/{}", id);

    let (status, record) = server
        .patch(
            &path,
            &server.trainee_session,
            json!({ "updates": { "reflection": "went well" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{record}");
    assert_eq!(record["status"], "draft");
    assert_eq!(record["payload"]["title"], "Ward round");
    assert_eq!(record["payload"]["reflection"], "went well");
    assert_eq!(record["version"], 2);

    let (status, body) = server.get(&path, &server.stranger_session).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, body) = server
        .patch(&path, &server.stranger_session, json!({ "updates": { "x": 1 } }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{body}");

    let (status, _) = server
        .get(&format!("/evidence/{}", uuid::Uuid::new_v4()), &server.trainee_session)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_rejects_unknown_kind_and_non_object_payload() {
    let server = spawn_server(Mail::None).await;

    let (status, body) = server
        .post(
            "/evidence",
            Some(&server.trainee_session),
            json!({ "kind": "POSTER" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_kind");

    let (status, body) = server
        .post(
            "/evidence",
            Some(&server.trainee_session),
            json!({ "kind": "CBD", "payload": [1, 2] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn test_in_app_sign_off_burns_outstanding_link() {
    let server = spawn_server(Mail::None).await;
    let id = server.draft("DOPS", json!({ "procedure": "cannula" })).await;
    let token = server.issue(&id, "DOPS").await["token"]
        .as_str()
        .unwrap()
        .to_string();

    // Submitted records are locked for the owner.
    let (status, body) = server
        .patch(
            &format!("/evidence/{}", id),
            &server.trainee_session,
            json!({ "updates": { "procedure": "arterial line" } }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "illegal_transition");

    let (status, record) = server
        .post(
            &format!("/evidence/{}/sign-off", id),
            Some(&server.supervisor_session),
            json!({ "updates": { "outcome": "competent" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{record}");
    assert_eq!(record["status"], "signed_off");
    assert_eq!(record["payload"]["outcome"], "competent");
    assert_eq!(record["supervisor"]["name"], "Dr Sam Supervisor");

    let v = server.validate(&token).await;
    assert_eq!(v["valid"], false);
    assert_eq!(v["reason"], "target_signed_off");
}

#[tokio::test]
async fn test_decline_returns_record_to_draft() {
    let server = spawn_server(Mail::None).await;
    let id = server.draft("CBD", json!({})).await;
    server.issue(&id, "CBD").await;

    let (status, body) = server
        .post(
            &format!("/evidence/{}/decline", id),
            Some(&server.trainee_session),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["code"], "illegal_transition");

    let (status, record) = server
        .post(
            &format!("/evidence/{}/decline", id),
            Some(&server.supervisor_session),
            json!({ "reason": "wrong case" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{record}");
    assert_eq!(record["status"], "draft");

    let (status, _) = server
        .patch(
            &format!("/evidence/{}", id),
            &server.trainee_session,
            json!({ "updates": { "case": "the right one" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_amendment_reopens_only_requested_fields() {
    let server = spawn_server(Mail::None).await;
    let id = server
        .draft("CBD", json!({ "case": "sepsis", "reflection": "short" }))
        .await;
    let token = server.issue(&id, "CBD").await["token"]
        .as_str()
        .unwrap()
        .to_string();
    let (status, _) = server.submit(&token, &id, json!({}), true).await;
    assert_eq!(status, StatusCode::OK);

    let (status, request) = server
        .post(
            &format!("/evidence/{}/edit-requests", id),
            Some(&server.trainee_session),
            json!({ "fields": ["reflection"], "reason": "expand reflection" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{request}");
    assert_eq!(request["status"], "pending");
    let request_id = request["id"].as_str().unwrap().to_string();

    let (status, list) = server
        .get(
            &format!("/evidence/{}/edit-requests", id),
            &server.supervisor_session,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    // Only the supervisor of record decides.
    let (status, _) = server
        .post(
            &format!("/edit-requests/{}/approve", request_id),
            Some(&server.stranger_session),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, approved) = server
        .post(
            &format!("/edit-requests/{}/approve", request_id),
            Some(&server.supervisor_session),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{approved}");
    assert_eq!(approved["edit_request"]["status"], "approved");
    assert_eq!(approved["evidence"]["status"], "draft");
    assert_eq!(approved["evidence"]["unlocked_fields"], json!(["reflection"]));
    assert!(approved["evidence"]["signed_off_at"].is_string());

    let path = format!("/evidence/{}", id);
    let (status, body) = server
        .patch(&path, &server.trainee_session, json!({ "updates": { "case": "other" } }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");

    let (status, record) = server
        .patch(
            &path,
            &server.trainee_session,
            json!({ "updates": { "reflection": "much longer" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{record}");
    assert_eq!(record["payload"]["reflection"], "much longer");
    assert_eq!(record["payload"]["case"], "sepsis");

    // A decided request cannot be decided again.
    let (status, body) = server
        .post(
            &format!("/edit-requests/{}/deny", request_id),
            Some(&server.supervisor_session),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn test_linked_evidence_is_visible_through_the_link() {
    let server = spawn_server(Mail::None).await;
    let id = server.draft("ARCP", json!({})).await;
    let context = server.draft("MSF", json!({ "summary": "positive" })).await;

    let (status, body) = server
        .post(
            &format!("/evidence/{}/links", id),
            Some(&server.trainee_session),
            json!({ "linked_evidence_id": context }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = server
        .post(
            &format!("/evidence/{}/links", id),
            Some(&server.trainee_session),
            json!({ "linked_evidence_id": id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (_, view) = server
        .get(&format!("/evidence/{}", id), &server.trainee_session)
        .await;
    assert_eq!(view["linked_evidence"][0]["id"], context.as_str());

    let token = server.issue(&id, "ARCP").await["token"]
        .as_str()
        .unwrap()
        .to_string();
    let v = server.validate(&token).await;
    assert_eq!(v["linked_evidence"][0]["payload"]["summary"], "positive");

    // Context records are read-only to the link holder.
    let (status, _) = server
        .submit(&token, &context, json!({ "summary": "edited" }), false)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_magic_link_listing_hides_tokens() {
    let server = spawn_server(Mail::None).await;
    let id = server.draft("GSAT", json!({})).await;
    server.issue(&id, "GSAT").await;
    server.issue(&id, "GSAT").await;

    let (status, links) = server
        .get(&format!("/evidence/{}/magic-links", id), &server.trainee_session)
        .await;
    assert_eq!(status, StatusCode::OK);
    let links = links.as_array().unwrap();
    assert_eq!(links.len(), 2);
    for link in links {
        assert_eq!(link["recipient_email"], "dr.sup@example.org");
        assert_eq!(link["form_type"], "GSAT");
        assert!(link.get("token").is_none());
        assert!(link.get("token_hash").is_none());
    }

    let (status, _) = server
        .get(&format!("/evidence/{}/magic-links", id), &server.supervisor_session)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_owner_withdraws_misaddressed_submission_after_expiry() {
    let server = spawn_server(Mail::None).await;
    let id = server.draft("CBD", json!({ "case": "chest pain" })).await;
    let (status, body) = server
        .post(
            "/create-magic-link",
            Some(&server.trainee_session),
            json!({
                "evidence_id": id,
                "recipient_email": "dr.supp@example.org",
                "form_type": "CBD",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let path = format!("/evidence/{}/withdraw", id);
    let (status, body) = server
        .post(&path, Some(&server.trainee_session), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["code"], "invalid_request");

    let (status, _) = server
        .post(&path, Some(&server.supervisor_session), json!({}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    server.clock.advance(chrono::Duration::hours(24));
    let (status, record) = server
        .post(&path, Some(&server.trainee_session), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{record}");
    assert_eq!(record["status"], "draft");
    assert!(record["supervisor"].is_null());

    let created = server.issue(&id, "CBD").await;
    assert_eq!(created["success"], true);
    let v = server.validate(created["token"].as_str().unwrap()).await;
    assert_eq!(v["evidence"]["supervisor"]["email"], "dr.sup@example.org");
}
