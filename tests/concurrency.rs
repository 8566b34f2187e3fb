mod common;

use axum::http::StatusCode;
use common::*;
use passkey_rp_server::db::credentials;
use serde_json::json;

fn file_database(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}", dir.path().join("passkeys.db").display())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_challenge_is_consumed_by_exactly_one_verifier() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(&file_database(&dir), 60_000).await;
    let app = passkey_rp_server::router(state.clone());

    let mut authenticator = Authenticator::es256();
    register(&app, &authenticator, "u1").await;

    let challenge = authentication_challenge(&app, json!([authenticator.id()])).await;
    let assertion = authenticator.assertion(&challenge);

    let (first, second) = tokio::join!(
        post(&app, "/verify-authentication", assertion.clone()),
        post(&app, "/verify-authentication", assertion),
    );

    let outcomes = [first, second];
    let accepted = outcomes
        .iter()
        .filter(|(status, _)| *status == StatusCode::OK)
        .count();
    assert_eq!(accepted, 1, "{outcomes:?}");

    let (status, body) = outcomes
        .iter()
        .find(|(status, _)| *status != StatusCode::OK)
        .unwrap();
    assert_eq!(*status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "CeremonyNotFoundError");

    let stored = credentials::find_by_credential_id(&state.db, &authenticator.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.sign_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_counter_value_is_accepted_once_across_ceremonies() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(&file_database(&dir), 60_000).await;
    let app = passkey_rp_server::router(state.clone());

    let authenticator = Authenticator::es256();
    register(&app, &authenticator, "u1").await;

    // Two live ceremonies, both answered with the same counter value
    let first_challenge = authentication_challenge(&app, json!([authenticator.id()])).await;
    let second_challenge = authentication_challenge(&app, json!([authenticator.id()])).await;
    let first_assertion = authenticator.assertion_with_counter(&first_challenge, 3);
    let second_assertion = authenticator.assertion_with_counter(&second_challenge, 3);

    let (first, second) = tokio::join!(
        post(&app, "/verify-authentication", first_assertion),
        post(&app, "/verify-authentication", second_assertion),
    );

    let outcomes = [first, second];
    let accepted = outcomes
        .iter()
        .filter(|(status, _)| *status == StatusCode::OK)
        .count();
    assert_eq!(accepted, 1, "{outcomes:?}");

    let (status, body) = outcomes
        .iter()
        .find(|(status, _)| *status != StatusCode::OK)
        .unwrap();
    assert_eq!(*status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ReplayOrCloneSuspectedError");

    let stored = credentials::find_by_credential_id(&state.db, &authenticator.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.sign_count, 3);
}

#[tokio::test]
async fn state_survives_a_new_pool_on_the_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let url = file_database(&dir);
    let mut authenticator = Authenticator::es256();

    {
        let state = state_with(&url, 60_000).await;
        let app = passkey_rp_server::router(state.clone());
        register(&app, &authenticator, "u1").await;
        state.db.close().await;
    }

    // A second pool on the same file sees the credential registered through
    // the first.
    let state = state_with(&url, 60_000).await;
    let app = passkey_rp_server::router(state);
    let challenge = authentication_challenge(&app, json!([])).await;
    let (status, body) = post(&app, "/verify-authentication", authenticator.assertion(&challenge)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}
