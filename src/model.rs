//! Core data model.
//!
//! Teams own equipment; requests track maintenance work against a piece of
//! equipment. A request carries a team reference denormalized from the
//! equipment at creation time and never re-synced afterwards.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// Newtype for team ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamId(pub Uuid);

/// Newtype for equipment ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EquipmentId(pub Uuid);

/// Newtype for request ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

/// Newtype for user ids. Users live in the identity provider; the core
/// only ever references them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

macro_rules! id_impls {
    ($name:ident) => {
        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                // Short display: first 8 chars of UUID
                write!(f, "{}", &self.0.to_string()[..8])
            }
        }
    };
}

id_impls!(TeamId);
id_impls!(EquipmentId);
id_impls!(RequestId);
id_impls!(UserId);

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

/// A team that owns equipment. Immutable except rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TeamId::new(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Equipment
// ---------------------------------------------------------------------------

/// A tracked piece of equipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    pub id: EquipmentId,

    pub name: String,
    pub description: String,

    /// Owning team. Requests snapshot this at creation time.
    pub assigned_team_id: Option<TeamId>,

    /// One-way flag: set when a request against this equipment reaches
    /// Scrap, never cleared by this core.
    pub is_scrapped: bool,

    pub warranty_expiry: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Equipment {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EquipmentId::new(),
            name: name.into(),
            description: String::new(),
            assigned_team_id: None,
            is_scrapped: false,
            warranty_expiry: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn assigned_to(mut self, team_id: TeamId) -> Self {
        self.assigned_team_id = Some(team_id);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A maintenance request against a piece of equipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,

    pub equipment_id: EquipmentId,

    /// Denormalized from `Equipment.assigned_team_id` when the request was
    /// created. Later equipment reassignment does not touch this.
    pub team_id: Option<TeamId>,

    #[serde(rename = "type")]
    pub kind: RequestType,

    pub status: Status,

    /// Set exactly when the request passes through Repaired.
    pub duration_hours: Option<f64>,

    /// Meaningful for Preventive requests.
    pub scheduled_date: Option<NaiveDate>,

    pub title: String,
    pub description: String,

    pub created_by: Option<UserId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What kind of maintenance a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    Corrective,
    Preventive,
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestType::Corrective => "Corrective",
            RequestType::Preventive => "Preventive",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RequestType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "corrective" => Ok(RequestType::Corrective),
            "preventive" => Ok(RequestType::Preventive),
            _ => Err(crate::error::Error::Validation(format!(
                "unknown request type: {s}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    New,
    #[serde(rename = "In Progress")]
    InProgress,
    /// Done. Terminal.
    Repaired,
    /// Equipment written off. Terminal; marks the equipment scrapped.
    Scrap,
}

impl Status {
    /// The exhaustive set of targets reachable from this status. Any pair
    /// not covered here is rejected.
    pub fn allowed_targets(self) -> &'static [Status] {
        match self {
            Status::New => &[Status::InProgress],
            Status::InProgress => &[Status::Repaired, Status::Scrap],
            Status::Repaired | Status::Scrap => &[],
        }
    }

    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        self.allowed_targets().contains(&to)
    }

    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Repaired | Status::Scrap)
    }

    /// Human-readable valid-target list, for error messages.
    pub fn allowed_display(self) -> String {
        let targets = self.allowed_targets();
        if targets.is_empty() {
            "none".to_string()
        } else {
            targets
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::New => "New",
            Status::InProgress => "In Progress",
            Status::Repaired => "Repaired",
            Status::Scrap => "Scrap",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], " ").as_str() {
            "new" => Ok(Status::New),
            "in progress" => Ok(Status::InProgress),
            "repaired" => Ok(Status::Repaired),
            "scrap" => Ok(Status::Scrap),
            _ => Err(crate::error::Error::Validation(format!(
                "unknown status: {s}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Role of a user. Only managers may mutate requests or equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Technician,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Manager => "manager",
            Role::Technician => "technician",
        };
        write!(f, "{s}")
    }
}

/// A user profile, owned by the identity provider and consumed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub team_id: Option<TeamId>,
    pub full_name: String,
}
