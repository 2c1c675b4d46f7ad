//! Terminal front end
//!
//! Every command drives the same view state the app screens are made of: the login form, the
//! root gate and the roster list. Alerts raised by the views end the command with an error.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use roster::model::{NewStudent, Session, Student, StudentPatch};
use roster::presentation::list::{EMPTY_HINT, EMPTY_TITLE};
use roster::presentation::{Alert, ListStatus, LoginMode, LoginView, RootGate, Route, RosterView};
use roster::{AuthGateway, RosterGateway, auth, students};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::opt::Command;

/// How long a successful sign in waits for the gate to follow
const ROUTE_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not logged in, use `roster login` or `roster register` first")]
    NotLoggedIn,
    #[error("{}: {}", .0.title, .0.message)]
    Alert(Alert),
    #[error(transparent)]
    Auth(#[from] auth::Error),
    #[error(transparent)]
    Roster(#[from] students::Error),
    #[error("Terminal failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes a single roster entry
fn render_student(out: &mut impl Write, student: &Student) -> std::io::Result<()> {
    writeln!(out, "{} ({})", student.name, student.id)?;
    writeln!(out, "  Major: {}", student.major)?;
    writeln!(out, "  Email: {}", student.email)
}

/// Writes the roster screen
fn render_roster(out: &mut impl Write, view: &RosterView) -> std::io::Result<()> {
    writeln!(out, "Students")?;
    writeln!(out, "{}", view.header())?;
    writeln!(out)?;

    match view.status() {
        ListStatus::Loading => writeln!(out, "Loading...")?,
        ListStatus::Empty => {
            writeln!(out, "{EMPTY_TITLE}")?;
            writeln!(out, "{EMPTY_HINT}")?;
        }
        ListStatus::Ready => {
            for student in view.students() {
                render_student(out, student)?;
            }
        }
    }

    Ok(())
}

pub struct Shell<R, W> {
    auth: AuthGateway,
    roster: RosterGateway,
    gate: RootGate,
    input: R,
    output: W,
}

impl<R, W> Shell<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    /// Creates the shell and mounts the root gate
    pub fn new(auth: AuthGateway, roster: RosterGateway, input: R, output: W) -> Self {
        let mut gate = RootGate::new();
        let route = gate.mount(&auth);
        debug!(?route, "Shell started");

        Self {
            auth,
            roster,
            gate,
            input,
            output,
        }
    }

    /// Runs a single command, `shutdown` ends commands running until interrupted
    #[instrument(skip_all)]
    pub async fn run(
        &mut self,
        command: Command,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        use Command::*;

        match command {
            Register { email, password } => {
                self.sign_in(LoginMode::Register, email, password).await
            }
            Login { email, password } => self.sign_in(LoginMode::Login, email, password).await,
            Logout { yes } => self.logout(yes).await,
            Status => self.status(),
            List => self.list().await,
            Show { id } => self.show(&id).await,
            Add { name, email, major } => self.add(NewStudent::new(name, email, major)).await,
            Update {
                id,
                name,
                email,
                major,
            } => {
                let patch = StudentPatch {
                    name,
                    email,
                    major,
                };
                self.update(&id, patch).await
            }
            Delete { id } => self.delete(&id).await,
            Watch => self.watch(shutdown).await,
        }
    }

    /// Session of the signed in user, as the gate sees it
    fn require_logged_in(&self) -> Result<Session, Error> {
        match self.gate.route() {
            Route::LoggedIn => Ok(self.auth.cache().get()),
            _ => Err(Error::NotLoggedIn),
        }
    }

    async fn await_route(&self, expected: Route) {
        let mut route = self.gate.watch();
        let settled = timeout(
            ROUTE_SETTLE_TIMEOUT,
            route.wait_for(|route| *route == expected),
        )
        .await
        .map(|result| result.is_ok())
        .unwrap_or(false);

        if !settled {
            warn!(?expected, "Route did not settle");
        }
    }

    async fn sign_in(
        &mut self,
        mode: LoginMode,
        email: String,
        password: String,
    ) -> Result<(), Error> {
        let mut view = LoginView::new(self.auth.clone());
        if view.mode() != mode {
            view.toggle_mode();
        }
        view.email = email;
        view.password = password;

        if view.submit().await.is_none() {
            let alert = view
                .take_alert()
                .unwrap_or_else(|| Alert::new("Error", "Unknown failure"));
            return Err(Error::Alert(alert));
        }

        self.await_route(Route::LoggedIn).await;
        let session = self.require_logged_in()?;
        writeln!(
            self.output,
            "Logged in as: {}",
            session.email.unwrap_or_default()
        )?;
        Ok(())
    }

    async fn confirm(&mut self, prompt: &Alert) -> Result<bool, Error> {
        write!(self.output, "{}: {} [y/N] ", prompt.title, prompt.message)?;
        self.output.flush()?;

        let mut answer = String::new();
        self.input.read_line(&mut answer).await?;
        Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
    }

    async fn logout(&mut self, yes: bool) -> Result<(), Error> {
        let session = self.require_logged_in()?;

        let mut view = RosterView::new(self.roster.clone(), session);
        let prompt = view.request_logout();
        let confirmed = yes || self.confirm(&prompt).await?;
        if !view.resolve_logout(confirmed) {
            writeln!(self.output, "Logout cancelled")?;
            return Ok(());
        }

        let result = self.gate.logout(&self.auth).await;
        writeln!(self.output, "Logged out")?;
        Ok(result?)
    }

    fn status(&mut self) -> Result<(), Error> {
        match self.require_logged_in() {
            Ok(session) => writeln!(
                self.output,
                "Logged in as: {} ({})",
                session.email.unwrap_or_default(),
                session.user_id.unwrap_or_default()
            )?,
            Err(_) => writeln!(self.output, "Not logged in")?,
        }
        Ok(())
    }

    async fn list(&mut self) -> Result<(), Error> {
        let session = self.require_logged_in()?;

        let mut view = RosterView::new(self.roster.clone(), session);
        view.mount().await;
        if let Some(alert) = view.take_alert() {
            return Err(Error::Alert(alert));
        }

        render_roster(&mut self.output, &view)?;
        Ok(())
    }

    async fn show(&mut self, id: &str) -> Result<(), Error> {
        self.require_logged_in()?;
        let student = self.roster.get_by_id(id).await?;
        render_student(&mut self.output, &student)?;
        Ok(())
    }

    async fn add(&mut self, student: NewStudent) -> Result<(), Error> {
        self.require_logged_in()?;
        let id = self.roster.add(student).await?;
        writeln!(self.output, "Added student {id}")?;
        Ok(())
    }

    async fn update(&mut self, id: &str, patch: StudentPatch) -> Result<(), Error> {
        self.require_logged_in()?;
        self.roster.update(id, patch).await?;
        writeln!(self.output, "Updated student {id}")?;
        Ok(())
    }

    async fn delete(&mut self, id: &str) -> Result<(), Error> {
        self.require_logged_in()?;
        self.roster.delete(id).await?;
        writeln!(self.output, "Deleted student {id}")?;
        Ok(())
    }

    /// Renders the roster on every change until shutdown or logout
    async fn watch(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), Error> {
        let session = self.require_logged_in()?;
        let mut view = RosterView::new(self.roster.clone(), session);

        let (tx, mut snapshots) = mpsc::unbounded_channel();
        let _subscription = self.roster.listen(move |snapshot| {
            let _ = tx.send(snapshot);
        });

        let mut route = self.gate.watch();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                snapshot = snapshots.recv() => {
                    let Some(snapshot) = snapshot else {
                        return Ok(());
                    };
                    view.apply(snapshot);
                    if let Some(alert) = view.take_alert() {
                        return Err(Error::Alert(alert));
                    }
                    render_roster(&mut self.output, &view)?;
                    writeln!(self.output)?;
                    self.output.flush()?;
                }
                changed = route.changed() => {
                    if changed.is_err() || *route.borrow() == Route::LoggedOut {
                        writeln!(self.output, "Logged out")?;
                        return Ok(());
                    }
                }
                () = &mut shutdown => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use roster::SessionCache;
    use roster::storage::MemoryStore;

    use super::*;
    use crate::backend::Backend;

    struct Setup {
        backend: Backend,
        cache: SessionCache,
    }

    impl Setup {
        async fn new() -> Self {
            Self {
                backend: Backend::test().await.unwrap(),
                cache: SessionCache::new(Arc::new(MemoryStore::new())),
            }
        }

        fn roster(&self) -> RosterGateway {
            RosterGateway::new(self.backend.documents())
        }

        fn shell(&self, input: &'static str) -> Shell<&'static [u8], Vec<u8>> {
            let auth = AuthGateway::new(self.backend.identity(), self.cache.clone());
            Shell::new(auth, self.roster(), input.as_bytes(), Vec::new())
        }
    }

    async fn run<R: AsyncBufRead + Unpin>(
        shell: &mut Shell<R, Vec<u8>>,
        command: Command,
    ) -> Result<String, Error> {
        shell.output.clear();
        shell.run(command, std::future::pending()).await?;
        Ok(String::from_utf8(shell.output.clone()).unwrap())
    }

    fn register() -> Command {
        Command::Register {
            email: "ann@x.com".to_owned(),
            password: "secret1".to_owned(),
        }
    }

    fn add(name: &str) -> Command {
        Command::Add {
            name: name.to_owned(),
            email: format!("{}@x.com", name.to_lowercase()),
            major: "Math".to_owned(),
        }
    }

    #[tokio::test]
    async fn roster_requires_login() {
        let setup = Setup::new().await;
        let mut shell = setup.shell("");

        let err = run(&mut shell, Command::List).await.unwrap_err();
        assert!(matches!(err, Error::NotLoggedIn));

        let status = run(&mut shell, Command::Status).await.unwrap();
        assert_eq!(status, "Not logged in\n");
    }

    #[tokio::test]
    async fn register_add_and_list() {
        let setup = Setup::new().await;
        let mut shell = setup.shell("");

        let out = run(&mut shell, register()).await.unwrap();
        assert_eq!(out, "Logged in as: ann@x.com\n");

        let out = run(&mut shell, Command::List).await.unwrap();
        assert_eq!(
            out,
            format!("Students\nLogged in as: ann@x.com\n\n{EMPTY_TITLE}\n{EMPTY_HINT}\n")
        );

        run(&mut shell, add("Zed")).await.unwrap();
        run(&mut shell, add("Bob")).await.unwrap();

        let out = run(&mut shell, Command::List).await.unwrap();
        let names: Vec<_> = out
            .lines()
            .filter(|line| line.contains(" ("))
            .map(|line| line.split(" (").next().unwrap())
            .collect();
        assert_eq!(names, ["Bob", "Zed"]);
        assert!(out.contains("  Major: Math\n  Email: bob@x.com\n"));
    }

    #[tokio::test]
    async fn session_survives_new_shell() {
        let setup = Setup::new().await;
        run(&mut setup.shell(""), register()).await.unwrap();

        let mut shell = setup.shell("");
        let out = run(&mut shell, Command::Status).await.unwrap();
        assert!(out.starts_with("Logged in as: ann@x.com ("));
    }

    #[tokio::test]
    async fn failed_login_raises_alert() {
        let setup = Setup::new().await;
        let mut shell = setup.shell("");
        run(&mut shell, register()).await.unwrap();
        run(&mut shell, Command::Logout { yes: true }).await.unwrap();

        let err = run(
            &mut shell,
            Command::Login {
                email: "ann@x.com".to_owned(),
                password: "wrong-password".to_owned(),
            },
        )
        .await
        .unwrap_err();

        let Error::Alert(alert) = err else {
            panic!("Alert expected, got {err:?}");
        };
        assert_eq!(alert.title, "Login Failed");
        assert!(alert.message.contains("auth/wrong-password"));
        assert!(!setup.cache.is_logged_in());
    }

    #[tokio::test]
    async fn weak_password_registration_raises_alert() {
        let setup = Setup::new().await;
        let mut shell = setup.shell("");

        let err = run(
            &mut shell,
            Command::Register {
                email: "ann@x.com".to_owned(),
                password: "123".to_owned(),
            },
        )
        .await
        .unwrap_err();

        let Error::Alert(alert) = err else {
            panic!("Alert expected, got {err:?}");
        };
        assert_eq!(alert.title, "Registration Failed");
    }

    #[tokio::test]
    async fn logout_asks_for_confirmation() {
        let setup = Setup::new().await;
        run(&mut setup.shell(""), register()).await.unwrap();

        let mut shell = setup.shell("n\n");
        let out = run(&mut shell, Command::Logout { yes: false })
            .await
            .unwrap();
        assert_eq!(
            out,
            "Logout: Are you sure you want to logout? [y/N] Logout cancelled\n"
        );
        assert!(setup.cache.is_logged_in());

        let mut shell = setup.shell("y\n");
        let out = run(&mut shell, Command::Logout { yes: false })
            .await
            .unwrap();
        assert!(out.ends_with("Logged out\n"));
        assert!(!setup.cache.is_logged_in());

        let err = run(&mut shell, Command::List).await.unwrap_err();
        assert!(matches!(err, Error::NotLoggedIn));
    }

    #[tokio::test]
    async fn show_update_and_delete() {
        let setup = Setup::new().await;
        let mut shell = setup.shell("");
        run(&mut shell, register()).await.unwrap();

        let out = run(&mut shell, add("Ann")).await.unwrap();
        let id = out.trim().strip_prefix("Added student ").unwrap().to_owned();

        run(
            &mut shell,
            Command::Update {
                id: id.clone(),
                name: None,
                email: None,
                major: Some("CS".to_owned()),
            },
        )
        .await
        .unwrap();

        let out = run(&mut shell, Command::Show { id: id.clone() })
            .await
            .unwrap();
        assert_eq!(out, format!("Ann ({id})\n  Major: CS\n  Email: ann@x.com\n"));

        run(&mut shell, Command::Delete { id: id.clone() })
            .await
            .unwrap();
        let err = run(&mut shell, Command::Show { id }).await.unwrap_err();
        assert_eq!(err.to_string(), "Student not found");
    }

    #[tokio::test]
    async fn watch_renders_changes() {
        let setup = Setup::new().await;
        let mut shell = setup.shell("");
        run(&mut shell, register()).await.unwrap();

        let roster = setup.roster();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            roster
                .add(NewStudent::new("Ann", "ann@x.com", "Math"))
                .await
                .unwrap();
        });

        shell.output.clear();
        shell
            .run(
                Command::Watch,
                tokio::time::sleep(Duration::from_millis(500)),
            )
            .await
            .unwrap();
        writer.await.unwrap();

        let out = String::from_utf8(shell.output.clone()).unwrap();
        let empty = out.find(EMPTY_TITLE).unwrap();
        let filled = out.find("Ann (").unwrap();
        assert!(empty < filled);
    }
}
