//! Location pins
//!
//! Pins mark a point of interest on a plan (an issue, an RFI, a photo
//! location). Their position is stored in percentage space like annotation
//! geometry, so it survives re-rendering at any resolution or zoom.

use crate::coordinate::Percent;
use chrono::{DateTime, Utc};

pub type PinId = uuid::Uuid;

/// A pin placed on a plan
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pin {
    pub id: PinId,
    pub plan_id: String,
    pub x_position: f64,
    pub y_position: f64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub pin_type: String,
    pub status: String,
    /// Linked RFI, if any
    #[serde(default)]
    pub rfi_id: Option<String>,
    #[serde(default)]
    pub photo_count: u32,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Pin {
    /// Place a new pin, clamping the position onto the sheet
    pub fn place(plan_id: impl Into<String>, position: Percent, draft: PinDraft) -> Self {
        let position = position.clamped();
        Self {
            id: PinId::new_v4(),
            plan_id: plan_id.into(),
            x_position: position.x,
            y_position: position.y,
            title: draft.title,
            description: draft.description,
            pin_type: draft.pin_type,
            status: draft.status,
            rfi_id: draft.rfi_id,
            photo_count: 0,
            created_by: draft.created_by,
            assigned_to: draft.assigned_to,
            created_at: Utc::now(),
        }
    }

    pub fn position(&self) -> Percent {
        Percent::new(self.x_position, self.y_position)
    }

    pub fn has_rfi(&self) -> bool {
        self.rfi_id.is_some()
    }
}

/// User-supplied fields for a new pin
#[derive(Debug, Clone, PartialEq)]
pub struct PinDraft {
    pub title: String,
    pub description: String,
    pub pin_type: String,
    pub status: String,
    pub rfi_id: Option<String>,
    pub created_by: Option<String>,
    pub assigned_to: Option<String>,
}

impl PinDraft {
    /// An open issue pin with just a title
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            pin_type: "issue".to_string(),
            status: "open".to_string(),
            rfi_id: None,
            created_by: None,
            assigned_to: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn pin_type(mut self, pin_type: impl Into<String>) -> Self {
        self.pin_type = pin_type.into();
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn rfi(mut self, rfi_id: impl Into<String>) -> Self {
        self.rfi_id = Some(rfi_id.into());
        self
    }

    pub fn created_by(mut self, user: impl Into<String>) -> Self {
        self.created_by = Some(user.into());
        self
    }

    pub fn assigned_to(mut self, user: impl Into<String>) -> Self {
        self.assigned_to = Some(user.into());
        self
    }
}
