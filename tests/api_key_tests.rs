mod common;

use hermes::models::ApiKeyState;
use hermes::services::ApiKeyError;

#[tokio::test]
async fn test_key_lifecycle_pending_active_revoked() {
    let env = common::spawn_env().await;
    let state = &env.state;

    let registration = state
        .users
        .register("Alice", "alice@example.com")
        .await
        .unwrap();
    let key_id = registration.api_key.key.id.clone();
    let plaintext = registration.api_key.plaintext.to_string();
    assert_eq!(registration.api_key.key.state, ApiKeyState::Pending);

    // Pending keys do not authenticate.
    assert!(matches!(
        state.api_keys.verify(&plaintext).await,
        Err(ApiKeyError::InvalidKey)
    ));

    let approved = state.api_keys.approve(&key_id).await.unwrap();
    assert_eq!(approved.state, ApiKeyState::Active);

    let verified = state.api_keys.verify(&plaintext).await.unwrap();
    assert_eq!(verified.user_id, registration.user.id);
    assert_eq!(verified.key_id, key_id);

    let revoked = state.api_keys.revoke(&key_id).await.unwrap();
    assert_eq!(revoked.state, ApiKeyState::Revoked);
    assert!(matches!(
        state.api_keys.verify(&plaintext).await,
        Err(ApiKeyError::InvalidKey)
    ));

    // Revocation is terminal.
    assert!(matches!(
        state.api_keys.approve(&key_id).await,
        Err(ApiKeyError::InvalidStateTransition {
            from: ApiKeyState::Revoked,
            to: ApiKeyState::Active
        })
    ));
    assert!(matches!(
        state.api_keys.revoke(&key_id).await,
        Err(ApiKeyError::InvalidStateTransition { .. })
    ));
}

#[tokio::test]
async fn test_rejected_key_never_activates() {
    let env = common::spawn_env().await;
    let state = &env.state;

    let registration = state.users.register("Bob", "bob@example.com").await.unwrap();
    let key_id = registration.api_key.key.id.clone();

    let rejected = state.api_keys.reject(&key_id).await.unwrap();
    assert_eq!(rejected.state, ApiKeyState::Rejected);

    assert!(state.api_keys.approve(&key_id).await.is_err());
    assert!(
        state
            .api_keys
            .verify(&registration.api_key.plaintext)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_one_live_key_per_user() {
    let env = common::spawn_env().await;
    let state = &env.state;

    let registration = state
        .users
        .register("Carol", "carol@example.com")
        .await
        .unwrap();

    assert!(matches!(
        state.api_keys.issue_pending(&registration.user.id).await,
        Err(ApiKeyError::AlreadyPending)
    ));

    state
        .api_keys
        .revoke(&registration.api_key.key.id)
        .await
        .unwrap();
    let second = state
        .api_keys
        .issue_pending(&registration.user.id)
        .await
        .unwrap();
    assert_ne!(second.key.id, registration.api_key.key.id);

    let keys = state
        .api_keys
        .list_for_user(&registration.user.id)
        .await
        .unwrap();
    assert_eq!(keys.len(), 2);
    let live = state
        .api_keys
        .live_key_for_user(&registration.user.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(live.id, second.key.id);
}

#[tokio::test]
async fn test_verification_failures_are_indistinguishable() {
    let env = common::spawn_env().await;
    let state = &env.state;

    let (_, plaintext) = common::approved_user(
        state,
        "Dave",
        "dave@example.com",
        hermes::models::UserRole::User,
    )
    .await;

    let mut tampered = plaintext.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == '0' { '1' } else { '0' });

    let wrong_tag = plaintext.replacen("hrm_", "xyz_", 1);

    for presented in [
        "",
        "garbage",
        "hrm_00000000_0000",
        tampered.as_str(),
        wrong_tag.as_str(),
    ] {
        let err = state.api_keys.verify(presented).await.unwrap_err();
        assert!(matches!(err, ApiKeyError::InvalidKey), "{presented}");
        assert_eq!(err.to_string(), "invalid or revoked key");
    }

    assert!(state.api_keys.verify(&plaintext).await.is_ok());
}

#[tokio::test]
async fn test_keys_are_stored_hashed() {
    let env = common::spawn_env().await;
    let state = &env.state;

    let registration = state
        .users
        .register("Erin", "erin@example.com")
        .await
        .unwrap();
    let stored = state
        .api_keys
        .get(&registration.api_key.key.id)
        .await
        .unwrap();

    assert!(stored.key_hash.starts_with("$argon2id$"));
    assert!(!stored.key_hash.contains(registration.api_key.plaintext.as_str()));
    assert!(
        registration
            .api_key
            .plaintext
            .contains(&stored.key_prefix)
    );
    assert!(!format!("{:?}", registration.api_key).contains(registration.api_key.plaintext.as_str()));
}

#[tokio::test]
async fn test_unknown_key_id() {
    let env = common::spawn_env().await;
    assert!(matches!(
        env.state.api_keys.approve("no-such-key").await,
        Err(ApiKeyError::NotFound)
    ));
}
