//! Roster list view

use tracing::debug;

use crate::model::{Session, Student};
use crate::presentation::Alert;
use crate::students::{self, RosterGateway};

/// Title shown when the roster is empty
pub const EMPTY_TITLE: &str = "No students found";
/// Hint shown under [`EMPTY_TITLE`]
pub const EMPTY_HINT: &str = "Add students to the roster to see them here";

/// What the list area currently shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStatus {
    /// First fetch in flight, nothing to show yet
    Loading,
    Empty,
    Ready,
}

/// Read-only roster screen
///
/// Failed fetches raise an alert and keep the last fetched roster on screen.
pub struct RosterView {
    roster: RosterGateway,
    session: Session,
    students: Vec<Student>,
    loading: bool,
    refreshing: bool,
    confirming_logout: bool,
    alert: Option<Alert>,
}

impl RosterView {
    /// Creates the view for the cached session
    pub fn new(roster: RosterGateway, session: Session) -> Self {
        Self {
            roster,
            session,
            students: Vec::new(),
            loading: true,
            refreshing: false,
            confirming_logout: false,
            alert: None,
        }
    }

    /// Initial fetch when the view is entered
    pub async fn mount(&mut self) {
        self.fetch().await;
    }

    /// Pull to refresh
    pub async fn refresh(&mut self) {
        self.refreshing = true;
        self.fetch().await;
        self.refreshing = false;
    }

    async fn fetch(&mut self) {
        self.loading = true;
        let result = self.roster.get_all().await;
        self.apply(result);
    }

    /// Applies a fetched or pushed roster, the latest result wins
    pub fn apply(&mut self, result: Result<Vec<Student>, students::Error>) {
        self.loading = false;
        match result {
            Ok(students) => {
                debug!(count = students.len(), "Roster shown");
                self.students = students;
            }
            Err(err) => self.alert = Some(Alert::new("Error", err.to_string())),
        }
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn status(&self) -> ListStatus {
        match (self.loading, self.students.is_empty()) {
            (true, true) => ListStatus::Loading,
            (_, true) => ListStatus::Empty,
            (_, false) => ListStatus::Ready,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    /// Header subtitle naming the signed in account
    pub fn header(&self) -> String {
        format!(
            "Logged in as: {}",
            self.session.email.as_deref().unwrap_or_default()
        )
    }

    /// Pending alert, if any. Taking it acknowledges it.
    pub fn take_alert(&mut self) -> Option<Alert> {
        self.alert.take()
    }

    /// Asks for logout confirmation, returns the prompt to show
    pub fn request_logout(&mut self) -> Alert {
        self.confirming_logout = true;
        Alert::new("Logout", "Are you sure you want to logout?")
    }

    /// Resolves the logout prompt, returns `true` if the logout should proceed
    pub fn resolve_logout(&mut self, confirmed: bool) -> bool {
        let proceed = self.confirming_logout && confirmed;
        self.confirming_logout = false;
        proceed
    }
}
