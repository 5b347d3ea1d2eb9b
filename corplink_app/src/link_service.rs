use corplink_core::{
    Affiliation, Clock, CredentialRecord, DiscordId, LinkEvent, LinkEventKind, NotificationSink,
    SystemClock,
};
use corplink_sso::{AffiliationClient, LoginRequest, PendingLink, SsoClient, SsoError, StateCodec};
use corplink_store::CredentialStore;

use crate::{LinkError, affiliation::resolve_affiliation};

/// What the user gets to see once the link lands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkConfirmation {
    pub discord_id: DiscordId,
    pub discord_name: String,
    pub character_name: String,
    pub affiliation: Affiliation,
}

pub struct LinkService<C, A, S, N, T = SystemClock>
where
    C: SsoClient,
    A: AffiliationClient,
    S: CredentialStore,
    N: NotificationSink,
    T: Clock,
{
    sso: C,
    affiliation: A,
    store: S,
    notifier: N,
    state: StateCodec,
    clock: T,
}

impl<C, A, S, N> LinkService<C, A, S, N, SystemClock>
where
    C: SsoClient,
    A: AffiliationClient,
    S: CredentialStore,
    N: NotificationSink,
    <N as NotificationSink>::Error: std::fmt::Display,
{
    pub fn new(sso: C, affiliation: A, store: S, notifier: N, state: StateCodec) -> Self {
        Self::with_clock(sso, affiliation, store, notifier, state, SystemClock)
    }
}

impl<C, A, S, N, T> LinkService<C, A, S, N, T>
where
    C: SsoClient,
    A: AffiliationClient,
    S: CredentialStore,
    N: NotificationSink,
    <N as NotificationSink>::Error: std::fmt::Display,
    T: Clock,
{
    pub fn with_clock(
        sso: C,
        affiliation: A,
        store: S,
        notifier: N,
        state: StateCodec,
        clock: T,
    ) -> Self {
        Self {
            sso,
            affiliation,
            store,
            notifier,
            state,
            clock,
        }
    }

    /// Build the URL a user opens to authorize the link. All callback context
    /// travels inside the signed state token; nothing is stored yet.
    pub fn begin_authorization(
        &self,
        discord_id: &DiscordId,
        discord_name: &str,
    ) -> Result<LoginRequest, LinkError> {
        if discord_id.as_str().trim().is_empty() {
            return Err(LinkError::MissingIdentity);
        }

        let pending = PendingLink {
            discord_id: discord_id.clone(),
            discord_name: discord_name.to_owned(),
            issued_at: self.clock.now(),
        };
        let state = self
            .state
            .encode(&pending)
            .map_err(|err| LinkError::StateSigning(err.to_string()))?;

        Ok(LoginRequest {
            authorization_url: self.sso.authorize_url(&state),
            state,
        })
    }

    pub async fn complete_callback(
        &self,
        code: &str,
        state: &str,
    ) -> Result<LinkConfirmation, LinkError> {
        let now = self.clock.now();
        let pending = self.state.decode(state, now).map_err(invalid_state)?;

        let grant = self
            .sso
            .exchange_code(code)
            .await
            .map_err(exchange_failed)?;
        let verified = self
            .sso
            .verify(&grant.access_token)
            .await
            .map_err(exchange_failed)?;

        let affiliation = resolve_affiliation(&self.affiliation, verified.character_id).await;
        if !affiliation.is_resolved() {
            log::warn!(
                "persisting link for {} with unresolved affiliation",
                pending.discord_id
            );
        }

        let expires_at = now.checked_add(grant.expires_in).ok_or_else(|| {
            LinkError::TokenExchangeFailed(format!(
                "declared token lifetime {:?} overflows the clock",
                grant.expires_in
            ))
        })?;

        let record = CredentialRecord {
            discord_id: pending.discord_id.clone(),
            discord_name: pending.discord_name.clone(),
            character_id: verified.character_id,
            character_name: verified.character_name.clone(),
            affiliation: affiliation.clone(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_expires_at: expires_at,
            last_synced_at: now,
            // the store keeps the original value on re-authorization
            created_at: now,
        };
        self.store.upsert(&record).await?;

        let event = LinkEvent {
            discord_id: pending.discord_id.clone(),
            kind: LinkEventKind::Linked,
        };
        if let Err(err) = self.notifier.notify(event).await {
            log::warn!("linked notification for {} failed: {err}", pending.discord_id);
        }

        log::info!(
            "linked {} to character {} ({})",
            pending.discord_id,
            verified.character_id,
            verified.character_name
        );

        Ok(LinkConfirmation {
            discord_id: pending.discord_id,
            discord_name: pending.discord_name,
            character_name: verified.character_name,
            affiliation,
        })
    }
}

fn invalid_state(err: SsoError) -> LinkError {
    match err {
        SsoError::InvalidState(detail) => LinkError::InvalidState(detail),
        other => LinkError::InvalidState(other.to_string()),
    }
}

fn exchange_failed(err: SsoError) -> LinkError {
    LinkError::TokenExchangeFailed(err.to_string())
}
