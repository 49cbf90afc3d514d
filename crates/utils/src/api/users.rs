use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::double_option;

/// Access level of a user. Ordering follows privilege: staff < manager < admin.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Staff,
    Manager,
    Admin,
}

impl Role {
    pub fn at_least(self, required: Role) -> bool {
        self >= required
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Staff => "staff",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub department_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListUsersResponse {
    pub users: Vec<Profile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDepartmentsResponse {
    pub departments: Vec<Department>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDepartmentRequest {
    pub name: String,
}

/// Admin update of a user. `department_id: null` moves the user out of any department.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub department_id: Option<Option<Uuid>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_follows_privilege() {
        assert!(Role::Admin.at_least(Role::Manager));
        assert!(Role::Manager.at_least(Role::Manager));
        assert!(!Role::Staff.at_least(Role::Manager));
        assert!(Role::Staff.at_least(Role::Staff));
    }

    #[test]
    fn update_user_distinguishes_null_from_absent() {
        let absent: UpdateUserRequest = serde_json::from_str(r#"{"role":"manager"}"#).unwrap();
        assert_eq!(absent.role, Some(Role::Manager));
        assert_eq!(absent.department_id, None);

        let cleared: UpdateUserRequest =
            serde_json::from_str(r#"{"department_id":null}"#).unwrap();
        assert_eq!(cleared.department_id, Some(None));

        let id = Uuid::new_v4();
        let set: UpdateUserRequest =
            serde_json::from_str(&format!(r#"{{"department_id":"{id}"}}"#)).unwrap();
        assert_eq!(set.department_id, Some(Some(id)));
    }
}
