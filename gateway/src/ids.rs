//! Id generation shared across the session actor and the response
//! orchestrator.

pub fn new_event_id() -> String {
    format!("evt_{}", uuid::Uuid::new_v4().simple())
}

pub fn new_response_id() -> String {
    format!("resp_{}", uuid::Uuid::new_v4().simple())
}
