use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Conflict classification shown next to a job on the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    #[default]
    None,
    Capacity,
    Material,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::None => "none",
            ConflictKind::Capacity => "capacity",
            ConflictKind::Material => "material",
        }
    }

    pub fn is_conflict(&self) -> bool {
        !matches!(self, ConflictKind::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDetail {
    pub reason: String,
    pub recommendation: String,
}

/// Stock tier reported for a material line item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialStatus {
    #[default]
    Sufficient,
    Low,
    Critical,
    Unavailable,
}

impl MaterialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialStatus::Sufficient => "sufficient",
            MaterialStatus::Low => "low",
            MaterialStatus::Critical => "critical",
            MaterialStatus::Unavailable => "unavailable",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sufficient" => Some(MaterialStatus::Sufficient),
            "low" => Some(MaterialStatus::Low),
            "critical" => Some(MaterialStatus::Critical),
            "unavailable" => Some(MaterialStatus::Unavailable),
            _ => None,
        }
    }

    /// Critical and unavailable stock block the job from running.
    pub fn is_blocking(&self) -> bool {
        matches!(self, MaterialStatus::Critical | MaterialStatus::Unavailable)
    }
}

/// A material a job consumes, with the quantity it needs and what is on hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub name: String,
    pub required_quantity: f64,
    pub available_quantity: f64,
    #[serde(default)]
    pub status: MaterialStatus,
}

impl MaterialRequirement {
    pub fn new(
        name: impl Into<String>,
        required_quantity: f64,
        available_quantity: f64,
        status: MaterialStatus,
    ) -> Self {
        Self {
            name: name.into(),
            required_quantity,
            available_quantity,
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub name: String,
    /// Only used for load-percentage display; the validator never enforces it.
    #[serde(default = "default_capacity")]
    pub capacity: f64,
}

fn default_capacity() -> f64 {
    1.0
}

impl Machine {
    pub fn new(id: impl Into<String>, name: impl Into<String>, capacity: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub machine_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub conflict: ConflictKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_detail: Option<ConflictDetail>,
    #[serde(default)]
    pub materials: Vec<MaterialRequirement>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        machine_id: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            machine_id: machine_id.into(),
            start,
            end,
            prerequisites: Vec::new(),
            conflict: ConflictKind::None,
            conflict_detail: None,
            materials: Vec::new(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn placement(&self) -> Placement {
        Placement {
            machine_id: self.machine_id.clone(),
            start: self.start,
            end: self.end,
        }
    }

    /// Two jobs overlap when they share a machine and their `[start, end)` intervals intersect.
    pub fn overlaps(&self, other: &Job) -> bool {
        self.machine_id == other.machine_id
            && intervals_overlap(self.start, self.end, other.start, other.end)
    }

    pub fn blocking_materials(&self) -> impl Iterator<Item = &MaterialRequirement> {
        self.materials.iter().filter(|m| m.status.is_blocking())
    }

    pub(crate) fn place(&mut self, machine_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.machine_id = machine_id.to_string();
        self.start = start;
        self.end = end;
    }
}

/// Where a job sits: machine plus time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub machine_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}
