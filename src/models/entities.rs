//! Records exchanged with the backend REST API.
//!
//! Field names follow the backend's snake_case JSON. Dates stay strings
//! except where the core needs to reason about them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A local chapter (Sabha Center).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SabhaCenter {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub address: String,
    pub responsible_person: String,
    pub contact_number: String,
}

/// Payload for creating or updating a chapter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewSabhaCenter {
    pub name: String,
    pub city: String,
    pub address: String,
    pub responsible_person: String,
    pub contact_number: String,
}

/// A single event (Sabha) held at a chapter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Sabha {
    pub id: i64,
    pub topic: String,
    pub speaker_name: String,
    pub date: String,
    pub sabha_center_id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewSabha {
    pub topic: String,
    pub speaker_name: String,
    pub date: String,
    pub sabha_center_id: i64,
}

/// A roster member.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Youth {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub origin_city_india: String,
    #[serde(default)]
    pub current_city_germany: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub karyakarta_id: Option<i64>,
    #[serde(default)]
    pub karyakarta_name: Option<String>,
    #[serde(default)]
    pub educational_field: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub sabha_centers: Vec<SabhaCenter>,
}

impl Youth {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewYouth {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub birth_date: Option<NaiveDate>,
    pub origin_city_india: String,
    pub current_city_germany: String,
    pub is_active: bool,
    pub karyakarta_id: Option<i64>,
    pub educational_field: String,
    pub sabha_center_ids: Vec<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

/// Presence of one youth at one event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub youth_id: i64,
    pub sabha_id: i64,
    pub status: AttendanceStatus,
}
