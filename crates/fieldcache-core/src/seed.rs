//! Sample records for development and demos.
//!
//! The dashboard's pages are bound to these until a real backend exists.
//! Generation is deterministic so screenshots and tests stay stable.

use serde_json::{json, Map, Value};

/// Identifier of the seeded demo account
pub const DEMO_EMAIL: &str = "demo@example.org";

const FIRST_NAMES: &[&str] = &[
    "Amina", "Chinedu", "Fatima", "Ibrahim", "Grace", "Musa", "Halima", "Joseph",
];
const LAST_NAMES: &[&str] = &["Okafor", "Bello", "Mensah", "Abubakar", "Nwosu", "Danjuma"];
const VILLAGES: &[&str] = &["Dala", "Gwale", "Tarauni", "Ungogo", "Kumbotso"];
const CROPS: &[&str] = &["maize", "sorghum", "cassava", "groundnut", "cowpea"];

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn demo_users() -> Vec<Map<String, Value>> {
    vec![
        object(json!({
            "email": DEMO_EMAIL,
            "name": "Demo Officer",
            "role": "admin",
        })),
        object(json!({
            "email": "agent@example.org",
            "name": "Field Agent",
            "role": "extension_agent",
        })),
        object(json!({
            "email": "viewer@example.org",
            "name": "Programme Viewer",
            "role": "viewer",
        })),
    ]
}

/// `count` farmer-member records cycling through the sample name lists.
pub fn demo_members(count: usize) -> Vec<Map<String, Value>> {
    (0..count)
        .map(|i| {
            let first = FIRST_NAMES[i % FIRST_NAMES.len()];
            let last = LAST_NAMES[(i / FIRST_NAMES.len() + i) % LAST_NAMES.len()];
            object(json!({
                "name": format!("{} {}", first, last),
                "village": VILLAGES[i % VILLAGES.len()],
                "group": format!("VSLA-{:02}", i % 6 + 1),
                "primary_crop": CROPS[(i * 3) % CROPS.len()],
                "plots": i % 4 + 1,
            }))
        })
        .collect()
}
