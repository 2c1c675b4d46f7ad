//! Email/password accounts

use async_trait::async_trait;
use base64::prelude::*;
use roster::model::User;
use roster::provider::{AuthStateCallback, IdentityProvider, ProviderError};
use roster::subscription::{Listener, Subscription};
use sha3::{Digest, Sha3_256};
use sqlx::SqlitePool;
use tokio::sync::watch;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Secret mixed into every password hash. For now it is a constant, but it should be fed from an
/// environment variable during the build.
const PASSWORD_APP_SECRET: &str = "RosterAppPasswordSecret";

/// Shortest accepted password
const MIN_PASSWORD_LEN: usize = 6;

fn internal(err: impl std::fmt::Display) -> ProviderError {
    super::internal("auth/internal-error", err)
}

fn invalid_email() -> ProviderError {
    ProviderError::new("auth/invalid-email", "The email address is badly formatted.")
}

/// Rejects obviously broken addresses, the rest is up to the mail system
fn check_email(email: &str) -> Result<(), ProviderError> {
    let (local, domain) = email.split_once('@').ok_or_else(invalid_email)?;
    let well_formed = !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !email.contains(char::is_whitespace);

    if well_formed {
        Ok(())
    } else {
        Err(invalid_email())
    }
}

/// Stored password verifier
///
/// The password itself is never stored. The hash is computed over
/// `{APP_SECRET}.{salt}.{password}`, where `salt` is a random Uuid encoded with Base64, so equal
/// passwords of different accounts never share a hash.
#[derive(Debug, Clone)]
struct Credentials {
    /// Per account random salt
    salt: Uuid,
    /// Expected hash
    password_hash: [u8; 32],
}

impl Credentials {
    /// Generates credentials with a fresh salt
    fn generate(password: &str) -> Self {
        let salt = Uuid::new_v4();
        Self {
            salt,
            password_hash: Self::hash(salt, password),
        }
    }

    fn hash(salt: Uuid, password: &str) -> [u8; 32] {
        let salt = BASE64_STANDARD.encode(salt.as_bytes());
        let data = format!("{PASSWORD_APP_SECRET}.{salt}.{password}");

        let mut hasher = Sha3_256::new();
        hasher.update(data.as_bytes());
        hasher.finalize().into()
    }

    fn verify(&self, password: &str) -> bool {
        Self::hash(self.salt, password) == self.password_hash
    }
}

/// Identity provider keeping accounts in SQLite
///
/// The signed in account is persisted, so a restarted process comes back signed in the way a
/// hosted SDK restores its session.
pub struct SqliteIdentityProvider {
    db: SqlitePool,
    current: watch::Sender<Option<User>>,
}

impl SqliteIdentityProvider {
    /// Creates the provider restoring the persisted sign in
    pub async fn connect(db: SqlitePool) -> Result<Self, ProviderError> {
        let row: Option<(Uuid, String)> = sqlx::query_as(
            "select accounts.id, accounts.email from auth_state \
             join accounts on accounts.id = auth_state.account_id",
        )
        .fetch_optional(&db)
        .await
        .map_err(internal)?;

        let user = row.map(|(id, email)| User::new(id.to_string(), email));
        debug!(restored = ?user, "Identity provider connected");

        let (current, _) = watch::channel(user);
        Ok(Self { db, current })
    }

    /// Marks the account as signed in, in the database and in memory
    async fn sign_in_account(&self, id: Uuid, email: String) -> Result<User, ProviderError> {
        sqlx::query(
            "insert into auth_state (slot, account_id) values (0, ?) \
             on conflict(slot) do update set account_id = excluded.account_id",
        )
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(internal)?;

        let user = User::new(id.to_string(), email);
        self.current.send_replace(Some(user.clone()));
        Ok(user)
    }
}

#[async_trait]
impl IdentityProvider for SqliteIdentityProvider {
    #[instrument(skip(self, password))]
    async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<User, ProviderError> {
        check_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ProviderError::new(
                "auth/weak-password",
                format!("Password should be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }

        let id = Uuid::new_v4();
        let credentials = Credentials::generate(password);

        let insertion = sqlx::query(
            "insert into accounts (id, email, salt, password_hash) values (?, ?, ?, ?) \
             on conflict(email) do nothing",
        )
        .bind(id)
        .bind(email)
        .bind(credentials.salt)
        .bind(credentials.password_hash.as_slice())
        .execute(&self.db)
        .await
        .map_err(internal)?;

        if insertion.rows_affected() == 0 {
            return Err(ProviderError::new(
                "auth/email-already-in-use",
                "The email address is already in use by another account.",
            ));
        }

        info!(%id, "Account created");
        self.sign_in_account(id, email.to_owned()).await
    }

    #[instrument(skip(self, password))]
    async fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<User, ProviderError> {
        check_email(email)?;

        let (id, email, salt, password_hash): (Uuid, String, Uuid, Vec<u8>) = sqlx::query_as(
            "select id, email, salt, password_hash from accounts where email = ?",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ProviderError::new(
                "auth/user-not-found",
                "There is no user record corresponding to this identifier.",
            )
        })?;

        let password_hash: [u8; 32] = password_hash
            .try_into()
            .map_err(|_| internal("Password hash malformed in the database"))?;

        let credentials = Credentials {
            salt,
            password_hash,
        };
        if !credentials.verify(password) {
            return Err(ProviderError::new(
                "auth/wrong-password",
                "The password is invalid or the user does not have a password.",
            ));
        }

        self.sign_in_account(id, email).await
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), ProviderError> {
        sqlx::query("delete from auth_state")
            .execute(&self.db)
            .await
            .map_err(internal)?;

        self.current.send_replace(None);
        Ok(())
    }

    /// The sign in restored by [`connect`](Self::connect) is reported right away, even if nobody
    /// signed in during this process, the way the hosted SDK restores its session on relaunch.
    fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    /// Delivered from a spawned task. Transitions following each other quickly may be coalesced,
    /// the latest identity is always delivered.
    fn on_auth_state_changed(&self, callback: AuthStateCallback) -> Subscription {
        let listener = Listener::new(callback);
        let mut current = self.current.subscribe();

        let task = tokio::spawn({
            let listener = listener.clone();
            async move {
                loop {
                    let user = current.borrow_and_update().clone();
                    if !listener.deliver(user) || current.changed().await.is_err() {
                        break;
                    }
                }
            }
        });

        let task = task.abort_handle();
        Subscription::new(move || {
            listener.cancel();
            task.abort();
        })
    }
}
