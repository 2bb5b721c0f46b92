mod common;

use hermes::crypto::SecretKind;
use hermes::models::UserRole;
use hermes::services::{EmailBotError, EmailBotUpdate, NewEmailBot};
use zeroize::Zeroizing;

fn new_bot(email: &str, password: &str) -> NewEmailBot {
    NewEmailBot {
        sender_email: email.to_string(),
        app_password: Zeroizing::new(password.to_string()),
        display_name: Some("Alice's Bot".to_string()),
        smtp_server: None,
        smtp_port: None,
    }
}

#[tokio::test]
async fn test_create_list_and_decrypt() {
    let env = common::spawn_env().await;
    let state = &env.state;
    let (alice, _) =
        common::approved_user(state, "Alice", "alice@example.com", UserRole::User).await;

    let bot_id = state
        .email_bots
        .create(&alice, new_bot("AliceBot@Gmail.com", "abcd efgh ijkl mnop"))
        .await
        .unwrap();

    let bots = state.email_bots.list(&alice).await.unwrap();
    assert_eq!(bots.len(), 1);
    assert_eq!(bots[0].id, bot_id);
    assert_eq!(bots[0].sender_email, "alicebot@gmail.com");
    assert_eq!(bots[0].smtp_server, "smtp.gmail.com");
    assert_eq!(bots[0].smtp_port, 587);
    let listed = serde_json::to_string(&bots).unwrap();
    assert!(!listed.contains("abcd efgh"));

    let creds = state.email_bots.decrypt_for_send(&bot_id).await.unwrap();
    assert_eq!(creds.owner_id, alice);
    assert_eq!(creds.sender_email, "alicebot@gmail.com");
    assert_eq!(creds.app_password.as_str(), "abcd efgh ijkl mnop");
    assert!(!format!("{creds:?}").contains("abcd efgh"));

    // Both fields are stored encrypted, never as plaintext.
    for kind in SecretKind::ALL {
        let record = state.secrets.get(&bot_id, kind).await.unwrap();
        assert_eq!(record.key_version, state.crypto.current_version());
        let raw = String::from_utf8_lossy(&record.ciphertext).to_string();
        assert!(!raw.contains("alicebot") && !raw.contains("abcd"));
    }
}

#[tokio::test]
async fn test_other_users_cannot_touch_a_bot() {
    let env = common::spawn_env().await;
    let state = &env.state;
    let (alice, _) =
        common::approved_user(state, "Alice", "alice@example.com", UserRole::User).await;
    let (mallory, _) =
        common::approved_user(state, "Mallory", "mallory@example.com", UserRole::User).await;

    let bot_id = state
        .email_bots
        .create(&alice, new_bot("bot@example.com", "secret-password"))
        .await
        .unwrap();

    let update = EmailBotUpdate {
        app_password: Some(Zeroizing::new("stolen".to_string())),
        ..EmailBotUpdate::default()
    };
    assert!(matches!(
        state.email_bots.update(&bot_id, &mallory, update).await,
        Err(EmailBotError::Forbidden)
    ));
    assert!(matches!(
        state.email_bots.delete(&bot_id, &mallory).await,
        Err(EmailBotError::Forbidden)
    ));
    assert!(matches!(
        state.email_bots.get(&bot_id, &mallory).await,
        Err(EmailBotError::Forbidden)
    ));
    assert!(state.email_bots.list(&mallory).await.unwrap().is_empty());

    let creds = state.email_bots.decrypt_for_send(&bot_id).await.unwrap();
    assert_eq!(creds.app_password.as_str(), "secret-password");
}

#[tokio::test]
async fn test_update_reencrypts_only_changed_fields() {
    let env = common::spawn_env().await;
    let state = &env.state;
    let (alice, _) =
        common::approved_user(state, "Alice", "alice@example.com", UserRole::User).await;

    let bot_id = state
        .email_bots
        .create(&alice, new_bot("bot@example.com", "first-password"))
        .await
        .unwrap();
    let email_before = state.secrets.get(&bot_id, SecretKind::BotEmail).await.unwrap();
    let password_before = state
        .secrets
        .get(&bot_id, SecretKind::BotPassword)
        .await
        .unwrap();

    let summary = state
        .email_bots
        .update(
            &bot_id,
            &alice,
            EmailBotUpdate {
                app_password: Some(Zeroizing::new("second-password".to_string())),
                display_name: Some(None),
                smtp_port: Some(465),
                ..EmailBotUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(summary.display_name, None);
    assert_eq!(summary.smtp_port, 465);

    let email_after = state.secrets.get(&bot_id, SecretKind::BotEmail).await.unwrap();
    let password_after = state
        .secrets
        .get(&bot_id, SecretKind::BotPassword)
        .await
        .unwrap();
    assert_eq!(email_after, email_before);
    assert_ne!(password_after.nonce, password_before.nonce);

    let creds = state.email_bots.decrypt_for_send(&bot_id).await.unwrap();
    assert_eq!(creds.app_password.as_str(), "second-password");
    assert_eq!(creds.smtp_port, 465);
}

#[tokio::test]
async fn test_delete_purges_secrets() {
    let env = common::spawn_env().await;
    let state = &env.state;
    let (alice, _) =
        common::approved_user(state, "Alice", "alice@example.com", UserRole::User).await;

    let bot_id = state
        .email_bots
        .create(&alice, new_bot("bot@example.com", "pw-123456"))
        .await
        .unwrap();
    state.email_bots.delete(&bot_id, &alice).await.unwrap();

    for kind in SecretKind::ALL {
        assert!(state.secrets.get(&bot_id, kind).await.is_err());
    }
    assert!(matches!(
        state.email_bots.decrypt_for_send(&bot_id).await,
        Err(EmailBotError::NotFound)
    ));
    assert!(matches!(
        state.email_bots.delete(&bot_id, &alice).await,
        Err(EmailBotError::NotFound)
    ));
}

#[tokio::test]
async fn test_invalid_input_is_rejected() {
    let env = common::spawn_env().await;
    let state = &env.state;
    let (alice, _) =
        common::approved_user(state, "Alice", "alice@example.com", UserRole::User).await;

    assert!(matches!(
        state
            .email_bots
            .create(&alice, new_bot("not-an-email", "pw-123456"))
            .await,
        Err(EmailBotError::Validation(_))
    ));

    let mut bad_server = new_bot("bot@example.com", "pw-123456");
    bad_server.smtp_server = Some("smtp example com; rm -rf".to_string());
    assert!(matches!(
        state.email_bots.create(&alice, bad_server).await,
        Err(EmailBotError::Validation(_))
    ));

    assert!(state.email_bots.list(&alice).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_update_changes_nothing() {
    let env = common::spawn_env().await;
    let state = &env.state;
    let (alice, _) =
        common::approved_user(state, "Alice", "alice@example.com", UserRole::User).await;

    let bot_id = state
        .email_bots
        .create(&alice, new_bot("bot@example.com", "first-password"))
        .await
        .unwrap();
    let email_before = state.secrets.get(&bot_id, SecretKind::BotEmail).await.unwrap();
    let password_before = state
        .secrets
        .get(&bot_id, SecretKind::BotPassword)
        .await
        .unwrap();

    for update in [
        EmailBotUpdate {
            sender_email: Some("new@example.com".to_string()),
            app_password: Some(Zeroizing::new("second-password".to_string())),
            smtp_port: Some(0),
            ..EmailBotUpdate::default()
        },
        EmailBotUpdate {
            sender_email: Some("new@example.com".to_string()),
            smtp_server: Some("bad host!".to_string()),
            ..EmailBotUpdate::default()
        },
        EmailBotUpdate {
            sender_email: Some("new@example.com".to_string()),
            app_password: Some(Zeroizing::new("   ".to_string())),
            ..EmailBotUpdate::default()
        },
    ] {
        assert!(matches!(
            state.email_bots.update(&bot_id, &alice, update).await,
            Err(EmailBotError::Validation(_))
        ));
    }

    assert_eq!(
        state.secrets.get(&bot_id, SecretKind::BotEmail).await.unwrap(),
        email_before
    );
    assert_eq!(
        state
            .secrets
            .get(&bot_id, SecretKind::BotPassword)
            .await
            .unwrap(),
        password_before
    );
    let creds = state.email_bots.decrypt_for_send(&bot_id).await.unwrap();
    assert_eq!(creds.sender_email, "bot@example.com");
    assert_eq!(creds.app_password.as_str(), "first-password");
    assert_eq!(creds.smtp_port, 587);
}

#[tokio::test]
async fn test_list_skips_bot_without_stored_address() {
    let env = common::spawn_env().await;
    let state = &env.state;
    let (alice, _) =
        common::approved_user(state, "Alice", "alice@example.com", UserRole::User).await;

    let broken = state
        .email_bots
        .create(&alice, new_bot("broken@example.com", "pw-123456"))
        .await
        .unwrap();
    let healthy = state
        .email_bots
        .create(&alice, new_bot("healthy@example.com", "pw-123456"))
        .await
        .unwrap();
    assert!(
        state
            .secrets
            .delete(&broken, SecretKind::BotEmail)
            .await
            .unwrap()
    );

    let bots = state.email_bots.list(&alice).await.unwrap();
    assert_eq!(bots.len(), 1);
    assert_eq!(bots[0].id, healthy);
    assert_eq!(bots[0].sender_email, "healthy@example.com");
}
