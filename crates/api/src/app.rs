use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use cloudgate_access::{AccessError, AccessOrchestrator, CachedTokenSource};
use cloudgate_arm::{
    ArmApiVersions, ArmError, DirectoryClient, ResourceManagerClient,
};
use cloudgate_auth::SignedInUser;
use cloudgate_core::{DirectoryId, SubscriptionId, UserKey};
use cloudgate_identity::{
    AuthorityResolver, AzureAdSettings, DiscoveryFetcher, HttpDiscoveryFetcher, IdentityError,
    TokenClient, check_issuer, extract_claims,
};
use cloudgate_infra::{
    CredentialStore, InMemoryCredentialStore, InMemorySubscriptionStore, RedisCredentialStore,
    RedisSubscriptionStore, StoreError, SubscriptionRecord, SubscriptionStore, SyncedTokenCache,
    WritePolicy,
};

use crate::context::UserContext;
use crate::middleware::auth_middleware;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<AzureAdSettings>,
    pub orchestrator: Arc<AccessOrchestrator>,
    pub credentials: Arc<dyn CredentialStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub token_client: TokenClient,
    pub fetcher: Arc<dyn DiscoveryFetcher>,
    pub write_policy: WritePolicy,
}

/// Wire storage, identity and ARM clients into the router.
pub async fn build_app(settings: Arc<AzureAdSettings>) -> anyhow::Result<Router> {
    let http = reqwest::Client::builder()
        .timeout(settings.http_timeout())
        .build()?;

    let (credentials, subscriptions): (Arc<dyn CredentialStore>, Arc<dyn SubscriptionStore>) =
        match std::env::var("CLOUDGATE_REDIS_URL") {
            Ok(url) => (
                Arc::new(RedisCredentialStore::new(&url)?) as Arc<dyn CredentialStore>,
                Arc::new(RedisSubscriptionStore::new(&url)?) as Arc<dyn SubscriptionStore>,
            ),
            Err(_) => {
                tracing::warn!("CLOUDGATE_REDIS_URL not set; using in-memory stores (dev only)");
                (
                    Arc::new(InMemoryCredentialStore::new()) as Arc<dyn CredentialStore>,
                    Arc::new(InMemorySubscriptionStore::new()) as Arc<dyn SubscriptionStore>,
                )
            }
        };
    credentials.provision().await?;
    subscriptions.provision().await?;

    let write_policy = match std::env::var("CLOUDGATE_WRITE_POLICY").as_deref() {
        Ok("check-and-set") => WritePolicy::CheckAndSet,
        _ => WritePolicy::LastWriteWins,
    };

    let fetcher: Arc<dyn DiscoveryFetcher> = Arc::new(HttpDiscoveryFetcher::new(http.clone()));
    let token_client = TokenClient::new(
        http.clone(),
        settings.client_id.clone(),
        settings.client_secret.clone(),
    );

    let tokens = Arc::new(CachedTokenSource::new(
        settings.clone(),
        credentials.clone(),
        fetcher.clone(),
        token_client.clone(),
        write_policy,
    ));
    let arm = Arc::new(ResourceManagerClient::new(
        http.clone(),
        settings.resource_manager_url.clone(),
        ArmApiVersions {
            subscriptions: "2014-04-01".to_string(),
            permissions: settings.permissions_api_version.clone(),
            role_assignments: settings.role_assignments_api_version.clone(),
            role_definitions: settings.role_definitions_api_version.clone(),
        },
    ));
    let directory = Arc::new(DirectoryClient::new(
        http,
        settings.graph_api_identifier.clone(),
        settings.graph_api_version.clone(),
    ));
    let orchestrator = Arc::new(AccessOrchestrator::new(
        settings.clone(),
        tokens,
        arm,
        directory,
    ));

    let state = AppState {
        settings,
        orchestrator,
        credentials,
        subscriptions,
        token_client,
        fetcher,
        write_policy,
    };

    let protected = Router::new()
        .route("/subscriptions", get(list_subscriptions))
        .route("/subscriptions/:id/access", get(subscription_access))
        .route("/subscriptions/:id/connect", post(connect_subscription))
        .route("/subscriptions/:id/disconnect", post(disconnect_subscription))
        .route("/subscriptions/:id/repair", post(repair_subscription))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Ok(Router::new()
        .route("/auth/callback", post(auth_callback))
        .merge(protected)
        .with_state(state))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<Vec<SubscriptionRecord>>, ApiError> {
    let records = state
        .subscriptions
        .list_for_user(&ctx.user().user_key)
        .await?;
    Ok(Json(records))
}

#[derive(Debug, Serialize)]
struct AccessStatus {
    can_manage_access: bool,
    service_identity_has_read: bool,
}

async fn subscription_access(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<Json<AccessStatus>, ApiError> {
    let subscription_id = parse_subscription_id(&id)?;
    let user = ctx.user();
    let directory_id = directory_of(&state, user, subscription_id).await?;

    Ok(Json(AccessStatus {
        can_manage_access: state
            .orchestrator
            .can_user_manage_access(&user.user_key, subscription_id, directory_id)
            .await,
        service_identity_has_read: state
            .orchestrator
            .service_identity_has_read_access(subscription_id, directory_id)
            .await,
    }))
}

#[derive(Debug, Serialize)]
struct ConnectResponse {
    assignment_id: String,
}

async fn connect_subscription(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let subscription_id = parse_subscription_id(&id)?;
    let user = ctx.user();

    let directory_id = state
        .orchestrator
        .directory_for_subscription(subscription_id)
        .await?;

    // The session must have been authenticated against the owning tenant;
    // tell the client where to re-authenticate instead of redirecting.
    if directory_id != user.directory_id {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            format!(
                "subscription belongs to another directory; re-authenticate against {}",
                state.settings.authority_for_directory(&directory_id)
            ),
        ));
    }

    let assignment_id = state
        .orchestrator
        .grant_role_to_service_principal(&user.user_key, subscription_id, directory_id)
        .await?;

    state
        .subscriptions
        .upsert(&SubscriptionRecord {
            id: subscription_id,
            directory_id,
            connected_by: user.user_key.clone(),
            connected_on: Utc::now(),
        })
        .await?;

    Ok(Json(ConnectResponse { assignment_id }))
}

#[derive(Debug, Serialize)]
struct DisconnectResponse {
    removed_assignments: usize,
}

async fn disconnect_subscription(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    let subscription_id = parse_subscription_id(&id)?;
    let user = ctx.user();
    let directory_id = directory_of(&state, user, subscription_id).await?;

    let removed_assignments = state
        .orchestrator
        .revoke_role_from_service_principal(&user.user_key, subscription_id, directory_id)
        .await?;

    state
        .subscriptions
        .remove(&user.user_key, subscription_id)
        .await?;

    Ok(Json(DisconnectResponse {
        removed_assignments,
    }))
}

async fn repair_subscription(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let subscription_id = parse_subscription_id(&id)?;
    let user = ctx.user();
    let directory_id = directory_of(&state, user, subscription_id).await?;

    let assignment_id = state
        .orchestrator
        .repair_connection(&user.user_key, subscription_id, directory_id)
        .await?;

    Ok(Json(ConnectResponse { assignment_id }))
}

#[derive(Debug, Deserialize)]
struct AuthCallbackRequest {
    code: String,
    id_token: String,
}

#[derive(Debug, Serialize)]
struct AuthCallbackResponse {
    user_key: UserKey,
}

/// Authorization-code redemption: validate the id token's issuer, clear any
/// previously cached tokens for the user, then redeem the code through the
/// owning tenant's token endpoint and persist the fresh cache state.
async fn auth_callback(
    State(state): State<AppState>,
    Json(body): Json<AuthCallbackRequest>,
) -> Result<Json<AuthCallbackResponse>, ApiError> {
    let claims = extract_claims(&body.id_token)?;
    check_issuer(&claims.iss, &state.settings.trusted_issuer_prefix)?;

    let display_name = claims
        .display_name()
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "token has no name claim"))?;
    let directory_id = claims.directory_id()?;
    let user = SignedInUser::new(display_name, directory_id);

    let mut resolver =
        AuthorityResolver::new(state.settings.common_authority(), state.fetcher.clone());
    let authority = resolver
        .set_authority(&state.settings.authority_for_directory(&directory_id))
        .await?
        .clone();

    let mut cache = SyncedTokenCache::new(
        user.user_key.clone(),
        state.credentials.clone(),
        state.write_policy,
    );
    // Stale cached tokens must not survive a fresh login.
    cache.clear().await?;

    let mut session = cache.begin().await?;
    let redeemed = state
        .token_client
        .redeem_authorization_code(
            session.state_mut(),
            &authority,
            &user.user_key,
            &body.code,
            &state.settings.redirect_uri,
            &state.settings.resource_manager_identifier,
        )
        .await;
    session.commit().await?;
    redeemed?;

    tracing::info!(user = %user.user_key, directory = %directory_id, "authorization code redeemed");
    Ok(Json(AuthCallbackResponse {
        user_key: user.user_key,
    }))
}

/// Directory for a subscription: the stored record when connected, else the
/// unauthenticated challenge probe.
async fn directory_of(
    state: &AppState,
    user: &SignedInUser,
    subscription_id: SubscriptionId,
) -> Result<DirectoryId, ApiError> {
    if let Some(record) = state.subscriptions.get(&user.user_key, subscription_id).await? {
        return Ok(record.directory_id);
    }
    Ok(state
        .orchestrator
        .directory_for_subscription(subscription_id)
        .await?)
}

fn parse_subscription_id(raw: &str) -> Result<SubscriptionId, ApiError> {
    SubscriptionId::from_str(raw)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match e {
            StoreError::Conflict => StatusCode::CONFLICT,
            StoreError::Unavailable(_) | StoreError::Codec(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, e.to_string())
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        let status = match e {
            IdentityError::SilentAuthFailed(_) | IdentityError::UntrustedIssuer { .. } => {
                StatusCode::UNAUTHORIZED
            }
            IdentityError::Claims(_) => StatusCode::UNAUTHORIZED,
            IdentityError::AuthorityResolutionFailed(_)
            | IdentityError::TokenEndpoint { .. }
            | IdentityError::Transport(_) => StatusCode::BAD_GATEWAY,
            IdentityError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<ArmError> for ApiError {
    fn from(e: ArmError) -> Self {
        let status = match e {
            ArmError::DirectoryUndetermined { .. } => StatusCode::NOT_FOUND,
            ArmError::Upstream { .. } | ArmError::Transport { .. } | ArmError::Malformed { .. } => {
                StatusCode::BAD_GATEWAY
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<AccessError> for ApiError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::Identity(inner) => inner.into(),
            AccessError::Store(inner) => inner.into(),
            AccessError::Arm(inner) => inner.into(),
            other => ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, other.to_string()),
        }
    }
}
