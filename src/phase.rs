//! Phase ordering, roles, and the fixed capability table.
//!
//! Roles are an explicit enumeration matched by equality, never by name
//! prefix, so a misspelled actor name is a parse failure, not a silent
//! misclassification.

use serde::{Deserialize, Serialize};

/// The six ordered workflow phases. Each is owned exclusively by one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Research,
    Planning,
    Design,
    Implementation,
    Testing,
    Review,
}

impl Phase {
    /// All phases in workflow order.
    pub const ORDER: [Phase; 6] = [
        Phase::Research,
        Phase::Planning,
        Phase::Design,
        Phase::Implementation,
        Phase::Testing,
        Phase::Review,
    ];

    /// The phase a fresh workflow starts in.
    pub fn first() -> Phase {
        Phase::Research
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Research => "research",
            Phase::Planning => "planning",
            Phase::Design => "design",
            Phase::Implementation => "implementation",
            Phase::Testing => "testing",
            Phase::Review => "review",
        }
    }

    /// The configured successor, or `None` for the terminal phase.
    pub fn successor(self) -> Option<Phase> {
        match self {
            Phase::Research => Some(Phase::Planning),
            Phase::Planning => Some(Phase::Design),
            Phase::Design => Some(Phase::Implementation),
            Phase::Implementation => Some(Phase::Testing),
            Phase::Testing => Some(Phase::Review),
            Phase::Review => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.successor().is_none()
    }

    /// The role that exclusively owns this phase.
    pub fn role(self) -> Role {
        match self {
            Phase::Research => Role::ResearchPic,
            Phase::Planning => Role::PlanningPic,
            Phase::Design => Role::DesignPic,
            Phase::Implementation => Role::ImplementationPic,
            Phase::Testing => Role::TestingPic,
            Phase::Review => Role::ReviewPic,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ORDER
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown phase: {}", s))
    }
}

/// Status of a single phase within the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Skipped,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::InProgress => "in_progress",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Blocked => "blocked",
            PhaseStatus::Skipped => "skipped",
        }
    }
}

/// Pilot-in-command roles, one per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ResearchPic,
    PlanningPic,
    DesignPic,
    ImplementationPic,
    TestingPic,
    ReviewPic,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ResearchPic => "pic-research",
            Role::PlanningPic => "pic-planning",
            Role::DesignPic => "pic-design",
            Role::ImplementationPic => "pic-implementation",
            Role::TestingPic => "pic-testing",
            Role::ReviewPic => "pic-review",
        }
    }

    /// Parses an actor name by exact match.
    pub fn parse(s: &str) -> Option<Role> {
        [
            Role::ResearchPic,
            Role::PlanningPic,
            Role::DesignPic,
            Role::ImplementationPic,
            Role::TestingPic,
            Role::ReviewPic,
        ]
        .into_iter()
        .find(|r| r.as_str() == s)
    }

    /// The fixed capability set for this role.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::ResearchPic => &[Capability::Read],
            Role::PlanningPic | Role::DesignPic => &[Capability::Read, Capability::WriteDocs],
            Role::ImplementationPic => {
                &[Capability::Read, Capability::WriteCode, Capability::Execute]
            }
            Role::TestingPic => &[Capability::Read, Capability::WriteTests, Capability::Execute],
            Role::ReviewPic => &[Capability::Read, Capability::Assess],
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a role is allowed to do within its phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Read,
    WriteDocs,
    WriteCode,
    WriteTests,
    Execute,
    Assess,
}

/// Severity of a capability violation. Enforcement is advisory: `Minor`
/// is recorded and ignored, `Major` and `Critical` block the workflow
/// until a human clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Minor,
    Major,
    Critical,
}

impl std::str::FromStr for ViolationSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minor" => Ok(ViolationSeverity::Minor),
            "major" => Ok(ViolationSeverity::Major),
            "critical" => Ok(ViolationSeverity::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}
