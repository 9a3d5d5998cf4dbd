/// Why a sync run was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The periodic schedule fired.
    Schedule,
    /// The service just started with `schedule.run_on_startup`.
    Startup,
    /// Upstream published a release.
    Release { tag: String },
    /// Someone asked for a run via the trigger endpoint.
    Manual,
}

impl Trigger {
    pub fn description(&self) -> String {
        match self {
            Trigger::Schedule => "scheduled run".to_string(),
            Trigger::Startup => "startup run".to_string(),
            Trigger::Release { tag } => format!("release {tag} published"),
            Trigger::Manual => "manual dispatch".to_string(),
        }
    }
}
