use std::collections::BTreeSet;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::ValidationError;
use crate::geometry::{pad_to_plans, Offset};

/// Packed ARGB used for areas stored without a color.
pub const DEFAULT_AREA_COLOR: u32 = 0xFF2196F3;

// ========== ROLE ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Einsatzleiter,
    Bereichsleiter,
    #[default]
    Ordner,
}

// ========== USER ==========
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// `sha256$<salt>$<mac>` or, for accounts created by older clients, plaintext.
    pub password: String,
    #[serde(default, deserialize_with = "lenient::role")]
    pub role: Role,
}

/// What the API hands out about a user; never includes the password.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub username: String,
    pub role: Role,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            username: self.username.clone(),
            role: self.role,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub password: Option<String>,
    pub role: Option<Role>,
}

// ========== POINT ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PointType {
    #[default]
    EntryVehicle,
    EntryPedestrian,
    Gate,
    Block,
    Steward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "lenient::point_type")]
    pub point_type: PointType,
    /// One position per plan, stored as a single inner list `[[p0, p1, ...]]`.
    #[serde(
        default,
        serialize_with = "nested_positions",
        deserialize_with = "lenient::point_positions"
    )]
    pub positions: Vec<Offset>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_ready: bool,
    #[serde(default, deserialize_with = "lenient::usernames")]
    pub assigned_users: BTreeSet<String>,
}

/// Fields to override in [`Point::copy_with`]. `None` keeps the current value.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePointRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub point_type: Option<PointType>,
    #[serde(default, deserialize_with = "lenient::optional_point_positions")]
    pub positions: Option<Vec<Offset>>,
    pub is_ready: Option<bool>,
    pub assigned_users: Option<BTreeSet<String>>,
}

fn nested_positions<S: Serializer>(positions: &[Offset], s: S) -> Result<S::Ok, S::Error> {
    [positions].serialize(s)
}

impl Point {
    pub fn copy_with(&self, update: UpdatePointRequest) -> Point {
        Point {
            id: self.id.clone(),
            name: update.name.unwrap_or_else(|| self.name.clone()),
            point_type: update.point_type.unwrap_or(self.point_type),
            positions: update.positions.unwrap_or_else(|| self.positions.clone()),
            is_ready: update.is_ready.unwrap_or(self.is_ready),
            assigned_users: update
                .assigned_users
                .unwrap_or_else(|| self.assigned_users.clone()),
        }
    }

    pub fn validate(&self, plans: usize) -> Result<(), ValidationError> {
        validate_identity(&self.id, &self.name)?;
        if self.positions.len() != plans {
            return Err(ValidationError::PlanCount {
                expected: plans,
                found: self.positions.len(),
            });
        }
        for (plan, offset) in self.positions.iter().enumerate() {
            check_bounds(plan, offset)?;
        }
        Ok(())
    }

    pub fn pad_to_plans(&mut self, plans: usize) -> bool {
        pad_to_plans(&mut self.positions, plans)
    }
}

// ========== AREA ==========
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    pub id: String,
    pub name: String,
    /// One polygon per plan; vertex order defines the edges.
    #[serde(default, deserialize_with = "lenient::area_positions")]
    pub positions: Vec<Vec<Offset>>,
    #[serde(rename = "color", default = "default_color", deserialize_with = "lenient::color")]
    pub color_value: u32,
    #[serde(default, deserialize_with = "lenient::usernames")]
    pub assigned_users: BTreeSet<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_ready: bool,
}

/// Fields to override in [`Area::copy_with`]. `None` keeps the current value.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAreaRequest {
    pub name: Option<String>,
    pub positions: Option<Vec<Vec<Offset>>>,
    #[serde(rename = "color")]
    pub color_value: Option<u32>,
    pub is_ready: Option<bool>,
    pub assigned_users: Option<BTreeSet<String>>,
}

fn default_color() -> u32 {
    DEFAULT_AREA_COLOR
}

impl Area {
    pub fn copy_with(&self, update: UpdateAreaRequest) -> Area {
        Area {
            id: self.id.clone(),
            name: update.name.unwrap_or_else(|| self.name.clone()),
            positions: update.positions.unwrap_or_else(|| self.positions.clone()),
            color_value: update.color_value.unwrap_or(self.color_value),
            assigned_users: update
                .assigned_users
                .unwrap_or_else(|| self.assigned_users.clone()),
            is_ready: update.is_ready.unwrap_or(self.is_ready),
        }
    }

    /// A finalized area has a closed polygon (3+ vertices) on every plan.
    pub fn validate(&self, plans: usize) -> Result<(), ValidationError> {
        validate_identity(&self.id, &self.name)?;
        if self.positions.len() != plans {
            return Err(ValidationError::PlanCount {
                expected: plans,
                found: self.positions.len(),
            });
        }
        for (plan, vertices) in self.positions.iter().enumerate() {
            if vertices.len() < 3 {
                return Err(ValidationError::TooFewVertices {
                    plan,
                    found: vertices.len(),
                });
            }
            for offset in vertices {
                check_bounds(plan, offset)?;
            }
        }
        Ok(())
    }

    pub fn pad_to_plans(&mut self, plans: usize) -> bool {
        pad_to_plans(&mut self.positions, plans)
    }
}

fn validate_identity(id: &str, name: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::EmptyId);
    }
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(())
}

pub(crate) fn check_bounds(plan: usize, offset: &Offset) -> Result<(), ValidationError> {
    if offset.is_normalized() {
        Ok(())
    } else {
        Err(ValidationError::OutOfBounds {
            plan,
            dx: offset.dx,
            dy: offset.dy,
        })
    }
}

/// Deserializers that fall back to a default instead of failing the record.
mod lenient {
    use std::collections::BTreeSet;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::{PointType, Role, DEFAULT_AREA_COLOR};
    use crate::geometry::Offset;

    pub fn point_type<'de, D: Deserializer<'de>>(d: D) -> Result<PointType, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    pub fn role<'de, D: Deserializer<'de>>(d: D) -> Result<Role, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(Value::deserialize(d)?.as_bool().unwrap_or(false))
    }

    pub fn color<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(value
            .as_u64()
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or(DEFAULT_AREA_COLOR))
    }

    pub fn usernames<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeSet<String>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(value
            .as_array()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn offset(value: &Value) -> Option<Offset> {
        serde_json::from_value(value.clone()).ok()
    }

    fn polygon(value: &Value) -> Option<Vec<Offset>> {
        value.as_array()?.iter().map(offset).collect()
    }

    /// Nested lists are concatenated in order, so both `[[p0, p1, ...]]` and
    /// one single-entry list per plan `[[p0], [p1], ...]` read as `[p0, p1, ...]`.
    /// A flat `[p0, p1, ...]` is accepted too.
    fn parse_point_positions(value: &Value) -> Option<Vec<Offset>> {
        let entries = value.as_array()?;
        if entries.iter().all(Value::is_array) {
            let lists = entries.iter().map(polygon).collect::<Option<Vec<_>>>()?;
            Some(lists.into_iter().flatten().collect())
        } else {
            entries.iter().map(offset).collect()
        }
    }

    /// Anything malformed yields an empty list.
    pub fn point_positions<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Offset>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(parse_point_positions(&value).unwrap_or_default())
    }

    /// Same shapes as [`point_positions`], but a malformed override is an error.
    pub fn optional_point_positions<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Vec<Offset>>, D::Error> {
        let value = Value::deserialize(d)?;
        parse_point_positions(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom("positions must be a list of {dx, dy} coordinates"))
    }

    /// `[[{dx,dy}, ...], ...]`, one polygon per plan. A flat vertex list is a
    /// single-plan area from before plans existed.
    pub fn area_positions<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Vec<Vec<Offset>>, D::Error> {
        let value = Value::deserialize(d)?;
        let Some(entries) = value.as_array() else {
            return Ok(Vec::new());
        };

        let parsed = if entries.iter().all(Value::is_object) && !entries.is_empty() {
            polygon(&value).map(|vertices| vec![vertices])
        } else {
            entries.iter().map(polygon).collect::<Option<Vec<_>>>()
        };
        Ok(parsed.unwrap_or_default())
    }
}
