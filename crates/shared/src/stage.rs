//! Static pipeline stage registry.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::UnknownStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Inquiry,
    Qualified,
    Viewing,
    Negotiating,
    Closed,
}

impl StageId {
    /// Registry order, left to right on the board.
    pub const ALL: [StageId; 5] = [
        StageId::Inquiry,
        StageId::Qualified,
        StageId::Viewing,
        StageId::Negotiating,
        StageId::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageId::Inquiry => "inquiry",
            StageId::Qualified => "qualified",
            StageId::Viewing => "viewing",
            StageId::Negotiating => "negotiating",
            StageId::Closed => "closed",
        }
    }

    /// Exact match against the registry ids. Stage ids are stored lowercase,
    /// so `"Closed"` is not a registry id.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == raw)
    }

    pub fn stage(self) -> &'static Stage {
        &STAGES[self.position()]
    }

    pub fn position(self) -> usize {
        match self {
            StageId::Inquiry => 0,
            StageId::Qualified => 1,
            StageId::Viewing => 2,
            StageId::Negotiating => 3,
            StageId::Closed => 4,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// Presentation hint for a stage column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageColor {
    Blue,
    Yellow,
    Purple,
    Orange,
    Green,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub id: StageId,
    pub name: &'static str,
    pub color: StageColor,
}

pub const STAGES: [Stage; 5] = [
    Stage {
        id: StageId::Inquiry,
        name: "New Inquiry",
        color: StageColor::Blue,
    },
    Stage {
        id: StageId::Qualified,
        name: "Qualified",
        color: StageColor::Yellow,
    },
    Stage {
        id: StageId::Viewing,
        name: "Property Viewing",
        color: StageColor::Purple,
    },
    Stage {
        id: StageId::Negotiating,
        name: "Negotiating",
        color: StageColor::Orange,
    },
    Stage {
        id: StageId::Closed,
        name: "Closed",
        color: StageColor::Green,
    },
];

pub fn stages() -> &'static [Stage] {
    &STAGES
}

/// Looks up a raw stage id, e.g. a drop target forwarded by a view.
pub fn stage(raw: &str) -> Option<&'static Stage> {
    StageId::parse(raw).map(StageId::stage)
}
