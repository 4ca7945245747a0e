//! Session lifecycle: sign-in, sign-up, sign-out
//!
//! Opening a session writes the issued pair into the context's store and
//! re-arms the notifier; signing out clears the store and latches it closed.

use session_auth::{CredentialPair, SignInCredentials};
use tracing::info;

use crate::error::Result;
use crate::gateway::AuthGateway;

impl AuthGateway {
    /// Sign in with an existing account and store the issued credentials.
    pub async fn sign_in(&self, credentials: &SignInCredentials) -> Result<CredentialPair> {
        let pair = session_auth::sign_in(&self.client, &self.base_url, credentials).await?;
        self.open_session(pair.clone()).await?;
        info!(mode = self.context().mode().label(), "signed in");
        Ok(pair)
    }

    /// Create an account and sign straight into it.
    pub async fn sign_up(&self, credentials: &SignInCredentials) -> Result<CredentialPair> {
        let pair = session_auth::sign_up(&self.client, &self.base_url, credentials).await?;
        self.open_session(pair.clone()).await?;
        info!(mode = self.context().mode().label(), "signed up");
        Ok(pair)
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.context().store().clear().await?;
        self.context().notifier().session_ended();
        info!(mode = self.context().mode().label(), "signed out");
        Ok(())
    }

    async fn open_session(&self, pair: CredentialPair) -> Result<()> {
        let ctx = self.context();
        ctx.store().write(pair, ctx.credential_ttl()).await?;
        ctx.notifier().session_started();
        Ok(())
    }
}
