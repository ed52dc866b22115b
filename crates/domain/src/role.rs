//! Roles and the capability table.
//!
//! Authorization is decided in one place: [`Role::can`]. Call sites ask for a
//! [`Capability`] instead of comparing role names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Account role as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Classroom teacher.
    Teacher,
    /// School administrator.
    Admin,
    /// Platform super administrator.
    Super,
    /// Parent or guardian of one or more students.
    Parent,
    /// Student.
    Student,
}

/// Something a role may be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Create, edit and deactivate user accounts.
    ManageUsers,
    /// Create classes and manage enrolment.
    ManageClasses,
    /// Author quizzes and assignments.
    AuthorQuizzes,
    /// Grade submitted work.
    GradeSubmissions,
    /// Award or deduct XP points.
    AwardPoints,
    /// Create badges and grant them.
    ManageBadges,
    /// View class and school reports.
    ViewReports,
    /// View one's own progress, XP and badges.
    ViewOwnProgress,
    /// View the progress of linked children.
    ViewChildProgress,
    /// Attempt quizzes and submit assignments.
    TakeQuizzes,
}

const STAFF: &[Capability] = &[
    Capability::ManageClasses,
    Capability::AuthorQuizzes,
    Capability::GradeSubmissions,
    Capability::AwardPoints,
    Capability::ManageBadges,
    Capability::ViewReports,
];

impl Role {
    /// Returns all roles.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Teacher,
            Self::Admin,
            Self::Super,
            Self::Parent,
            Self::Student,
        ]
    }

    /// Returns the wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Admin => "admin",
            Self::Super => "super",
            Self::Parent => "parent",
            Self::Student => "student",
        }
    }

    /// Returns true if this role is granted `capability`.
    #[must_use]
    pub fn can(self, capability: Capability) -> bool {
        match self {
            Self::Super => true,
            Self::Admin => capability == Capability::ManageUsers || STAFF.contains(&capability),
            Self::Teacher => STAFF.contains(&capability),
            Self::Parent => capability == Capability::ViewChildProgress,
            Self::Student => matches!(
                capability,
                Capability::ViewOwnProgress | Capability::TakeQuizzes
            ),
        }
    }

    /// Returns true for roles that manage other users' work.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        matches!(self, Self::Teacher | Self::Admin | Self::Super)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teacher" => Ok(Self::Teacher),
            "admin" => Ok(Self::Admin),
            "super" => Ok(Self::Super),
            "parent" => Ok(Self::Parent),
            "student" => Ok(Self::Student),
            _ => Err(DomainError::UnknownRole(s.to_string())),
        }
    }
}
