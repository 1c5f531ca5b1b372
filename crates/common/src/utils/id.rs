use uuid::Uuid;

/// Generate a unique identifier using UUID v4
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
