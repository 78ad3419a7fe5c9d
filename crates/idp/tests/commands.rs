use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use idpstore_crypto::{AesCrypto, Key, KeyConfig, MemoryKeyStorage};
use idpstore_eventstore::prelude::*;
use idpstore_idp::{
    AllIdpWriteModel, CommandContext, Commands, CommandsConfig, Error, ErrorCode, IdpConfig,
    IdpState, IdpType, MigrationTarget, Owner, Provider,
    options::{LdapAttributes, Options},
    provider::{GITHUB_AUTHORIZATION_ENDPOINT, GOOGLE_ISSUER},
    variants::{
        azure_ad::AzureAdIdpConfig,
        github::{GitHubIdpChanged, GitHubIdpConfig},
        github_enterprise::GitHubEnterpriseIdpConfig,
        gitlab::GitLabIdpConfig,
        gitlab_self_hosted::GitLabSelfHostedIdpConfig,
        google::GoogleIdpConfig,
        jwt::JwtIdpConfig,
        ldap::LdapIdpConfig,
        oauth::OAuthIdpConfig,
        oidc::OidcIdpConfig,
    },
};
use tokio_util::sync::CancellationToken;

fn alg() -> Arc<AesCrypto> {
    let storage = MemoryKeyStorage::with_keys([Key::generate("idp-key")]);
    Arc::new(AesCrypto::new(&KeyConfig::new("idp-key"), &storage).unwrap())
}

fn commands_over<L: EventLog>(log: L) -> Commands<L> {
    Commands::new(
        log,
        alg(),
        CommandsConfig {
            max_push_retries: 3,
            storage_timeout: Some(Duration::from_secs(5)),
        },
    )
}

fn commands() -> Commands<InMemoryEventLog> {
    commands_over(InMemoryEventLog::new())
}

fn ctx() -> CommandContext {
    CommandContext::new("editor-1")
}

fn org() -> Owner {
    Owner::org("instance-1", "org-1")
}

fn github(name: &str) -> IdpConfig {
    IdpConfig::GitHub(GitHubIdpConfig {
        name: name.to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        scopes: vec!["read:user".to_string()],
        options: Options {
            is_creation_allowed: true,
            ..Default::default()
        },
    })
}

fn oidc() -> IdpConfig {
    IdpConfig::Oidc(OidcIdpConfig {
        name: "corporate".to_string(),
        issuer: "https://idp.example.com".to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        scopes: vec!["openid".to_string()],
        ..Default::default()
    })
}

// ============================================================================
// Add and materialize
// ============================================================================

#[tokio::test]
async fn added_provider_materializes_with_decrypted_secret() {
    let commands = commands();
    let (id, details) = commands.add_idp(&ctx(), &org(), &github("")).await.unwrap();

    assert_eq!(details.sequence, 1);
    assert_eq!(details.resource_owner, "org-1");
    assert_eq!(
        commands.idp_type(&ctx(), "instance-1", &id).await.unwrap(),
        IdpType::GitHub
    );

    let provider = commands
        .provider(&ctx(), "instance-1", &id, "https://login/callback")
        .await
        .unwrap();
    let Provider::GitHub(github) = provider else {
        panic!("expected a github provider");
    };
    assert_eq!(github.name, "GitHub");
    assert_eq!(github.client_secret.expose_secret(), "secret");
    assert_eq!(github.authorization_endpoint, GITHUB_AUTHORIZATION_ENDPOINT);
    assert_eq!(github.callback_url, "https://login/callback");
    assert!(github.options.creation_allowed);
}

#[tokio::test]
async fn ids_are_unique_across_scopes() {
    let commands = commands();
    commands
        .add_idp_with_id(&ctx(), &Owner::instance("instance-1"), "idp-1", &github("a"))
        .await
        .unwrap();

    let err = commands
        .add_idp_with_id(&ctx(), &org(), "idp-1", &github("b"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::AlreadyExists));
    assert_eq!(commands.log().len().await, 1);
}

#[tokio::test]
async fn invalid_config_is_rejected_before_loading() {
    let commands = commands();
    let config = IdpConfig::Jwt(JwtIdpConfig {
        name: "jwt".to_string(),
        ..Default::default()
    });

    let err = commands.add_idp(&ctx(), &org(), &config).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidArgument));
    assert!(commands.log().is_empty().await);
}

#[tokio::test]
async fn ldap_provider_carries_attribute_overrides() {
    let commands = commands();
    let config = IdpConfig::Ldap(LdapIdpConfig {
        name: "directory".to_string(),
        servers: vec!["ldaps://ldap.example.com".to_string()],
        base_dn: "dc=example,dc=com".to_string(),
        bind_dn: "cn=admin,dc=example,dc=com".to_string(),
        bind_password: "hunter2".to_string(),
        user_base: "dn".to_string(),
        user_object_classes: vec!["user".to_string()],
        user_filters: vec!["uid".to_string()],
        timeout: Duration::from_secs(30),
        attributes: LdapAttributes {
            email_attribute: "mail".to_string(),
            ..Default::default()
        },
        ..Default::default()
    });
    let (id, _) = commands.add_idp(&ctx(), &org(), &config).await.unwrap();

    let Provider::Ldap(ldap) = commands
        .provider(&ctx(), "instance-1", &id, "https://login/callback")
        .await
        .unwrap()
    else {
        panic!("expected an ldap provider");
    };
    assert_eq!(ldap.bind_password.expose_secret(), "hunter2");
    assert_eq!(ldap.timeout, Duration::from_secs(30));
    assert_eq!(ldap.attribute_overrides, [("email", "mail".to_string())]);
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn update_without_differences_pushes_nothing() {
    let commands = commands();
    let (id, _) = commands.add_idp(&ctx(), &org(), &github("a")).await.unwrap();

    let details = commands
        .update_idp(&ctx(), &org(), &id, &github("a"))
        .await
        .unwrap();

    // the secret is re-encrypted whenever one is given
    assert_eq!(details.sequence, 2);

    let IdpConfig::GitHub(mut keep_secret) = github("a") else {
        unreachable!()
    };
    keep_secret.client_secret.clear();
    let details = commands
        .update_idp(&ctx(), &org(), &id, &IdpConfig::GitHub(keep_secret))
        .await
        .unwrap();
    assert_eq!(details.sequence, 2);
    assert_eq!(details.resource_owner, "org-1");
    assert_eq!(commands.log().len().await, 2);
}

#[tokio::test]
async fn rename_keeps_stored_secret() {
    let commands = commands();
    let (id, _) = commands.add_idp(&ctx(), &org(), &github("a")).await.unwrap();

    let IdpConfig::GitHub(mut renamed) = github("b") else {
        unreachable!()
    };
    renamed.client_secret.clear();
    let details = commands
        .update_idp(&ctx(), &org(), &id, &IdpConfig::GitHub(renamed))
        .await
        .unwrap();
    assert_eq!(details.sequence, 2);

    let stored = commands
        .log()
        .filter(&SearchQuery::with_items([QueryItem::new().aggregate_ids([id.as_str()])]))
        .await
        .unwrap();
    assert_eq!(stored[1].event_type, "idp.github.changed");
    assert_eq!(stored[1].payload["name"], "b");
    assert!(stored[1].payload.get("clientSecret").is_none());

    let provider = commands
        .provider(&ctx(), "instance-1", &id, "https://cb")
        .await
        .unwrap();
    let Provider::GitHub(github) = provider else {
        panic!("expected a github provider");
    };
    assert_eq!(github.name, "b");
    assert_eq!(github.client_secret.expose_secret(), "secret");
}

#[tokio::test]
async fn update_of_unknown_provider_is_not_found() {
    let commands = commands();
    let err = commands
        .update_idp(&ctx(), &org(), "missing", &github("a"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));
}

// ============================================================================
// Remove
// ============================================================================

#[tokio::test]
async fn removed_provider_is_gone_for_every_command() {
    let commands = commands();
    let (id, _) = commands.add_idp(&ctx(), &org(), &github("a")).await.unwrap();
    commands
        .update_idp(&ctx(), &org(), &id, &github("b"))
        .await
        .unwrap();

    let details = commands.remove_idp(&ctx(), &org(), &id).await.unwrap();
    assert_eq!(details.sequence, 3);

    let err = commands.remove_idp(&ctx(), &org(), &id).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));

    let err = commands
        .update_idp(&ctx(), &org(), &id, &github("c"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));

    let err = commands
        .provider(&ctx(), "instance-1", &id, "https://cb")
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));
}

// ============================================================================
// Migration
// ============================================================================

#[tokio::test]
async fn oidc_provider_migrates_to_google() {
    let commands = commands();
    let (id, _) = commands.add_idp(&ctx(), &org(), &oidc()).await.unwrap();

    let target = MigrationTarget::Google(GoogleIdpConfig {
        client_id: "google-client".to_string(),
        client_secret: "google-secret".to_string(),
        ..Default::default()
    });
    let details = commands
        .migrate_oidc_idp(&ctx(), &org(), &id, &target)
        .await
        .unwrap();
    assert_eq!(details.sequence, 2);

    assert_eq!(
        commands.idp_type(&ctx(), "instance-1", &id).await.unwrap(),
        IdpType::Google
    );
    let Provider::Google(google) = commands
        .provider(&ctx(), "instance-1", &id, "https://cb")
        .await
        .unwrap()
    else {
        panic!("expected a google provider");
    };
    assert_eq!(google.issuer, GOOGLE_ISSUER);
    assert_eq!(google.client_secret.expose_secret(), "google-secret");

    let err = commands
        .update_idp(&ctx(), &org(), &id, &oidc())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::PreconditionFailed));

    let err = commands
        .migrate_oidc_idp(&ctx(), &org(), &id, &target)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::PreconditionFailed));
}

#[tokio::test]
async fn only_oidc_providers_migrate() {
    let commands = commands();
    let (id, _) = commands.add_idp(&ctx(), &org(), &github("a")).await.unwrap();

    let target = MigrationTarget::Google(GoogleIdpConfig {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        ..Default::default()
    });
    let err = commands
        .migrate_oidc_idp(&ctx(), &org(), &id, &target)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));
}

// ============================================================================
// Every kind
// ============================================================================

fn every_kind() -> Vec<IdpConfig> {
    let secret = || "secret".to_string();
    let client = || "client".to_string();
    vec![
        IdpConfig::OAuth(OAuthIdpConfig {
            name: "oauth".to_string(),
            client_id: client(),
            client_secret: secret(),
            authorization_endpoint: "https://oauth.example.com/authorize".to_string(),
            token_endpoint: "https://oauth.example.com/token".to_string(),
            user_endpoint: "https://oauth.example.com/user".to_string(),
            scopes: vec!["profile".to_string()],
            id_attribute: "sub".to_string(),
            ..Default::default()
        }),
        oidc(),
        IdpConfig::Jwt(JwtIdpConfig {
            name: "jwt".to_string(),
            issuer: "https://jwt.example.com".to_string(),
            jwt_endpoint: "https://jwt.example.com/token".to_string(),
            keys_endpoint: "https://jwt.example.com/keys".to_string(),
            header_name: "x-auth".to_string(),
            ..Default::default()
        }),
        IdpConfig::AzureAd(AzureAdIdpConfig {
            name: "azure".to_string(),
            client_id: client(),
            client_secret: secret(),
            tenant: "tenant-1".to_string(),
            ..Default::default()
        }),
        github("github"),
        IdpConfig::GitHubEnterprise(GitHubEnterpriseIdpConfig {
            name: "ghe".to_string(),
            client_id: client(),
            client_secret: secret(),
            authorization_endpoint: "https://ghe.example.com/login/oauth/authorize".to_string(),
            token_endpoint: "https://ghe.example.com/login/oauth/access_token".to_string(),
            user_endpoint: "https://ghe.example.com/api/v3/user".to_string(),
            ..Default::default()
        }),
        IdpConfig::GitLab(GitLabIdpConfig {
            name: "gitlab".to_string(),
            client_id: client(),
            client_secret: secret(),
            ..Default::default()
        }),
        IdpConfig::GitLabSelfHosted(GitLabSelfHostedIdpConfig {
            name: "gitlab-self-hosted".to_string(),
            issuer: "https://gitlab.example.com".to_string(),
            client_id: client(),
            client_secret: secret(),
            ..Default::default()
        }),
        IdpConfig::Google(GoogleIdpConfig {
            name: "google".to_string(),
            client_id: client(),
            client_secret: secret(),
            ..Default::default()
        }),
        IdpConfig::Ldap(LdapIdpConfig {
            name: "ldap".to_string(),
            servers: vec!["ldaps://ldap.example.com".to_string()],
            base_dn: "dc=example,dc=com".to_string(),
            bind_dn: "cn=admin,dc=example,dc=com".to_string(),
            bind_password: secret(),
            user_base: "dn".to_string(),
            user_object_classes: vec!["user".to_string()],
            user_filters: vec!["uid".to_string()],
            timeout: Duration::from_secs(10),
            ..Default::default()
        }),
    ]
}

/// The same config without a new secret, so the stored one is kept.
fn keep_secret(config: &IdpConfig) -> IdpConfig {
    let mut config = config.clone();
    match &mut config {
        IdpConfig::OAuth(c) => c.client_secret.clear(),
        IdpConfig::Oidc(c) => c.client_secret.clear(),
        IdpConfig::Jwt(_) => {}
        IdpConfig::AzureAd(c) => c.client_secret.clear(),
        IdpConfig::GitHub(c) => c.client_secret.clear(),
        IdpConfig::GitHubEnterprise(c) => c.client_secret.clear(),
        IdpConfig::GitLab(c) => c.client_secret.clear(),
        IdpConfig::GitLabSelfHosted(c) => c.client_secret.clear(),
        IdpConfig::Google(c) => c.client_secret.clear(),
        IdpConfig::Ldap(c) => c.bind_password.clear(),
    }
    config
}

fn renamed(config: &IdpConfig, name: &str) -> IdpConfig {
    let mut config = keep_secret(config);
    match &mut config {
        IdpConfig::OAuth(c) => c.name = name.to_string(),
        IdpConfig::Oidc(c) => c.name = name.to_string(),
        IdpConfig::Jwt(c) => c.name = name.to_string(),
        IdpConfig::AzureAd(c) => c.name = name.to_string(),
        IdpConfig::GitHub(c) => c.name = name.to_string(),
        IdpConfig::GitHubEnterprise(c) => c.name = name.to_string(),
        IdpConfig::GitLab(c) => c.name = name.to_string(),
        IdpConfig::GitLabSelfHosted(c) => c.name = name.to_string(),
        IdpConfig::Google(c) => c.name = name.to_string(),
        IdpConfig::Ldap(c) => c.name = name.to_string(),
    }
    config
}

#[tokio::test]
async fn every_kind_follows_the_same_lifecycle() {
    let kinds = every_kind();
    assert_eq!(kinds.len(), 10);

    for config in kinds {
        let kind = config.idp_type();
        let commands = commands();
        let (id, added) = commands.add_idp(&ctx(), &org(), &config).await.unwrap();
        assert_eq!(added.sequence, 1, "{kind}");
        assert_eq!(commands.idp_type(&ctx(), "instance-1", &id).await.unwrap(), kind);

        let unchanged = commands
            .update_idp(&ctx(), &org(), &id, &keep_secret(&config))
            .await
            .unwrap();
        assert_eq!(unchanged.sequence, 1, "{kind} pushed an empty change");

        let changed = commands
            .update_idp(&ctx(), &org(), &id, &renamed(&config, "renamed"))
            .await
            .unwrap();
        assert_eq!(changed.sequence, 2, "{kind}");
        let events = commands
            .log()
            .filter(&SearchQuery::with_items([QueryItem::new()]))
            .await
            .unwrap();
        let payload = events[1].payload.as_object().unwrap();
        let keys: Vec<&str> = payload.keys().map(String::as_str).collect();
        assert_eq!(keys, ["id", "name"], "{kind}");
        assert_eq!(payload["name"], "renamed");

        commands.remove_idp(&ctx(), &org(), &id).await.unwrap();

        let mut model = AllIdpWriteModel::new(&org(), &id, kind).unwrap();
        load(commands.log(), &mut model).await.unwrap();
        assert_eq!(model.state(), IdpState::Removed, "{kind}");
        let err = model.to_provider("https://login/callback", &*alg()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::PreconditionFailed), "{kind}");
    }
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn stale_precondition_conflicts_and_applies_nothing() {
    let commands = commands();
    let (id, _) = commands.add_idp(&ctx(), &org(), &github("a")).await.unwrap();
    commands
        .update_idp(&ctx(), &org(), &id, &github("b"))
        .await
        .unwrap();

    let aggregate = org().aggregate(&id);
    let stale = Push::new("editor-2")
        .expect(&aggregate, 1)
        .event(
            &aggregate,
            GitHubIdpChanged {
                id: id.clone(),
                name: Some("stale".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    let err = commands.log().push(stale).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(commands.log().len().await, 2);

    let fresh = Push::new("editor-2")
        .expect(&aggregate, 2)
        .event(
            &aggregate,
            GitHubIdpChanged {
                id: id.clone(),
                name: Some("fresh".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    commands.log().push(fresh).await.unwrap();
}

/// Lets a rival editor write to the stream right before the first push.
struct RacingLog {
    inner: InMemoryEventLog,
    raced: AtomicBool,
}

impl EventLog for RacingLog {
    async fn push(&self, push: Push) -> Result<Vec<StoredEvent>, EventstoreError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            if let Some(pending) = push.events.first() {
                let aggregate = pending.aggregate.clone();
                let rival = Push::new("rival")
                    .event(
                        &aggregate,
                        GitHubIdpChanged {
                            id: aggregate.id.clone(),
                            name: Some("rival".to_string()),
                            ..Default::default()
                        },
                    )
                    .map_err(EventstoreError::from)?;
                self.inner.push(rival).await?;
            }
        }
        self.inner.push(push).await
    }

    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, EventstoreError> {
        self.inner.filter(query).await
    }

    async fn latest_sequence(&self, query: &SearchQuery) -> Result<u64, EventstoreError> {
        self.inner.latest_sequence(query).await
    }

    async fn health(&self) -> Result<(), EventstoreError> {
        self.inner.health().await
    }
}

#[tokio::test]
async fn conflicting_update_is_reloaded_and_retried() {
    let log = InMemoryEventLog::new();
    let id = {
        let setup = commands_over(&log);
        let (id, _) = setup.add_idp(&ctx(), &org(), &github("a")).await.unwrap();
        id
    };

    let commands = commands_over(RacingLog {
        inner: log,
        raced: AtomicBool::new(false),
    });
    let IdpConfig::GitHub(mut renamed) = github("renamed") else {
        unreachable!()
    };
    renamed.client_secret.clear();
    let details = commands
        .update_idp(&ctx(), &org(), &id, &IdpConfig::GitHub(renamed))
        .await
        .unwrap();

    // added, rival change, retried change
    assert_eq!(details.sequence, 3);
}

/// Adds the same id in the instance scope right before the first push.
struct SiblingScopeLog {
    inner: InMemoryEventLog,
    raced: AtomicBool,
}

impl EventLog for SiblingScopeLog {
    async fn push(&self, push: Push) -> Result<Vec<StoredEvent>, EventstoreError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            if let Some(pending) = push.events.first() {
                let sibling = Owner::instance(pending.aggregate.instance_id.clone())
                    .aggregate(&pending.aggregate.id);
                let rival = Push::new("rival").expect(&sibling, 0).pending(PendingEvent {
                    aggregate: sibling,
                    event_type: pending.event_type.clone(),
                    payload: pending.payload.clone(),
                });
                self.inner.push(rival).await?;
            }
        }
        self.inner.push(push).await
    }

    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, EventstoreError> {
        self.inner.filter(query).await
    }

    async fn latest_sequence(&self, query: &SearchQuery) -> Result<u64, EventstoreError> {
        self.inner.latest_sequence(query).await
    }

    async fn health(&self) -> Result<(), EventstoreError> {
        self.inner.health().await
    }
}

#[tokio::test]
async fn racing_add_in_other_scope_is_rejected() {
    let log = InMemoryEventLog::new();
    let commands = commands_over(SiblingScopeLog {
        inner: log,
        raced: AtomicBool::new(false),
    });

    let err = commands
        .add_idp_with_id(&ctx(), &org(), "shared-id", &github("a"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::AlreadyExists));

    let kind = commands
        .idp_type(&ctx(), "instance-1", "shared-id")
        .await
        .unwrap();
    assert_eq!(kind, IdpType::GitHub);
    assert_eq!(commands.log().inner.len().await, 1);
}

// ============================================================================
// Cancellation and storage failures
// ============================================================================

#[tokio::test]
async fn cancelled_command_stores_nothing() {
    let commands = commands();
    let token = CancellationToken::new();
    token.cancel();

    let err = commands
        .add_idp(&ctx().with_cancellation(token), &org(), &github("a"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Eventstore(EventstoreError::Cancelled)));
    assert!(commands.log().is_empty().await);
}

#[tokio::test]
async fn unavailable_storage_is_retryable() {
    let commands = commands();
    commands.log().set_unavailable(true);

    let err = commands.add_idp(&ctx(), &org(), &github("a")).await.unwrap_err();
    assert!(matches!(&err, Error::Eventstore(e) if e.is_retryable()));

    commands.log().set_unavailable(false);
    commands.add_idp(&ctx(), &org(), &github("a")).await.unwrap();
}

#[tokio::test]
async fn unknown_id_has_no_kind() {
    let commands = commands();
    let err = commands
        .idp_type(&ctx(), "instance-1", "missing")
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));
}
