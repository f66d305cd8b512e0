use uuid::Uuid;

/// The signed-in identity. Used only to stamp the owner on writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
}

impl Session {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }
}
