//! Login and registration form

use tracing::debug;

use crate::auth::AuthGateway;
use crate::model::User;
use crate::presentation::Alert;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginMode {
    #[default]
    Login,
    Register,
}

/// Email/password form
///
/// Input is passed to the identity provider unchecked, the provider validates it.
pub struct LoginView {
    auth: AuthGateway,
    pub email: String,
    pub password: String,
    mode: LoginMode,
    submitting: bool,
    alert: Option<Alert>,
}

impl LoginView {
    pub fn new(auth: AuthGateway) -> Self {
        Self {
            auth,
            email: String::new(),
            password: String::new(),
            mode: LoginMode::default(),
            submitting: false,
            alert: None,
        }
    }

    pub fn mode(&self) -> LoginMode {
        self.mode
    }

    /// Switches between signing in and creating an account
    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            LoginMode::Login => LoginMode::Register,
            LoginMode::Register => LoginMode::Login,
        };
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Pending alert, if any. Taking it acknowledges it.
    pub fn take_alert(&mut self) -> Option<Alert> {
        self.alert.take()
    }

    /// Submits the form in the current mode
    ///
    /// On success the signed in user is returned, navigation follows from the auth state
    /// subscription. On failure the provider message is raised as an alert.
    pub async fn submit(&mut self) -> Option<User> {
        self.submitting = true;
        let result = match self.mode {
            LoginMode::Login => self.auth.login(&self.email, &self.password).await,
            LoginMode::Register => self.auth.register(&self.email, &self.password).await,
        };
        self.submitting = false;

        match result {
            Ok(user) => {
                debug!(mode = ?self.mode, "Form submitted");
                self.password.clear();
                Some(user)
            }
            Err(err) => {
                let title = match self.mode {
                    LoginMode::Login => "Login Failed",
                    LoginMode::Register => "Registration Failed",
                };
                self.alert = Some(Alert::new(title, err.to_string()));
                None
            }
        }
    }
}
