//! Points and areas under construction. A draft may be incomplete; `finalize`
//! turns it into a value the repository accepts.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::ValidationError;
use crate::geometry::{pad_to_plans, Offset};
use crate::plans::PlanSet;
use crate::types::{check_bounds, Area, Point, PointType, DEFAULT_AREA_COLOR};

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Ids are derived from the creation time in milliseconds. Ids handed out by
/// this process strictly increase, so two drafts started within the same
/// millisecond still get distinct ids.
pub fn new_resource_id() -> String {
    let now = chrono::Utc::now().timestamp_millis();
    let previous = LAST_ID
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        .unwrap_or(now);
    now.max(previous + 1).to_string()
}

fn checked(plans: usize, plan: usize, offset: Offset) -> Result<Offset, ValidationError> {
    if plan >= plans {
        return Err(ValidationError::UnknownPlan(plan));
    }
    check_bounds(plan, &offset)?;
    Ok(offset)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointDraft {
    pub id: String,
    pub name: String,
    pub point_type: PointType,
    pub assigned_users: BTreeSet<String>,
    pub is_ready: bool,
    positions: Vec<Option<Offset>>,
}

impl PointDraft {
    pub fn new(name: impl Into<String>, point_type: PointType, plans: usize) -> Self {
        Self {
            id: new_resource_id(),
            name: name.into(),
            point_type,
            assigned_users: BTreeSet::new(),
            is_ready: false,
            positions: vec![None; plans],
        }
    }

    /// Start editing an existing point.
    pub fn from_point(point: &Point, plans: usize) -> Self {
        let mut positions: Vec<Option<Offset>> = point.positions.iter().copied().map(Some).collect();
        pad_to_plans(&mut positions, plans);
        positions.resize(plans, None);
        Self {
            id: point.id.clone(),
            name: point.name.clone(),
            point_type: point.point_type,
            assigned_users: point.assigned_users.clone(),
            is_ready: point.is_ready,
            positions,
        }
    }

    pub fn position(&self, plan: usize) -> Option<Offset> {
        self.positions.get(plan).copied().flatten()
    }

    pub fn set_position(&mut self, plan: usize, offset: Offset) -> Result<(), ValidationError> {
        let offset = checked(self.positions.len(), plan, offset)?;
        self.positions[plan] = Some(offset);
        Ok(())
    }

    /// Fails when any plan lacks a position or the draft was started for a
    /// different number of plans.
    pub fn finalize(&self, plans: &PlanSet) -> Result<Point, ValidationError> {
        let positions = self
            .positions
            .iter()
            .enumerate()
            .map(|(plan, offset)| offset.ok_or(ValidationError::MissingPosition { plan }))
            .collect::<Result<Vec<_>, _>>()?;

        let point = Point {
            id: self.id.clone(),
            name: self.name.trim().to_string(),
            point_type: self.point_type,
            positions,
            is_ready: self.is_ready,
            assigned_users: self.assigned_users.clone(),
        };
        point.validate(plans.len())?;
        Ok(point)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AreaDraft {
    pub id: String,
    pub name: String,
    pub color_value: u32,
    pub assigned_users: BTreeSet<String>,
    pub is_ready: bool,
    positions: Vec<Vec<Offset>>,
}

impl AreaDraft {
    pub fn new(name: impl Into<String>, plans: usize) -> Self {
        Self {
            id: new_resource_id(),
            name: name.into(),
            color_value: DEFAULT_AREA_COLOR,
            assigned_users: BTreeSet::new(),
            is_ready: false,
            positions: vec![Vec::new(); plans],
        }
    }

    /// Start editing an existing area.
    pub fn from_area(area: &Area, plans: usize) -> Self {
        let mut positions = area.positions.clone();
        pad_to_plans(&mut positions, plans);
        positions.resize(plans, Vec::new());
        Self {
            id: area.id.clone(),
            name: area.name.clone(),
            color_value: area.color_value,
            assigned_users: area.assigned_users.clone(),
            is_ready: area.is_ready,
            positions,
        }
    }

    pub fn vertices(&self, plan: usize) -> &[Offset] {
        self.positions.get(plan).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_vertex(&mut self, plan: usize, offset: Offset) -> Result<(), ValidationError> {
        let offset = checked(self.positions.len(), plan, offset)?;
        self.positions[plan].push(offset);
        Ok(())
    }

    pub fn undo_vertex(&mut self, plan: usize) -> Option<Offset> {
        self.positions.get_mut(plan)?.pop()
    }

    pub fn clear_plan(&mut self, plan: usize) {
        if let Some(vertices) = self.positions.get_mut(plan) {
            vertices.clear();
        }
    }

    /// True once the polygon on `plan` can be closed.
    pub fn is_complete(&self, plan: usize) -> bool {
        self.vertices(plan).len() >= 3
    }

    pub fn finalize(&self, plans: &PlanSet) -> Result<Area, ValidationError> {
        let area = Area {
            id: self.id.clone(),
            name: self.name.trim().to_string(),
            positions: self.positions.clone(),
            color_value: self.color_value,
            assigned_users: self.assigned_users.clone(),
            is_ready: self.is_ready,
        };
        area.validate(plans.len())?;
        Ok(area)
    }
}
