//! Row visibility and permission rules.
//!
//! Single-row checks call the `can_*` functions directly. List queries bind a
//! [`TaskScope`] so that SQL filtering applies the same rules as
//! [`can_view_task`].

use utils::api::users::{Profile, Role};
use uuid::Uuid;

/// The authenticated caller, reduced to what the rules look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    pub department_id: Option<Uuid>,
}

impl Actor {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            user_id: profile.id,
            role: profile.role,
            department_id: profile.department_id,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn manages(&self, department_id: Option<Uuid>) -> bool {
        self.role == Role::Manager
            && self.department_id.is_some()
            && self.department_id == department_id
    }
}

/// The parts of a task that decide who may see or change it.
#[derive(Debug, Clone, Copy)]
pub struct TaskFacts<'a> {
    pub created_by: Uuid,
    pub department_id: Option<Uuid>,
    pub assignee_ids: &'a [Uuid],
}

impl TaskFacts<'_> {
    fn involves(&self, user_id: Uuid) -> bool {
        self.created_by == user_id || self.assignee_ids.contains(&user_id)
    }
}

pub fn can_view_task(actor: &Actor, task: &TaskFacts<'_>) -> bool {
    actor.is_admin() || task.involves(actor.user_id) || actor.manages(task.department_id)
}

pub fn can_edit_task(actor: &Actor, task: &TaskFacts<'_>) -> bool {
    can_view_task(actor, task)
}

/// Only managers and admins archive or restore, and only tasks they can see.
pub fn can_archive_task(actor: &Actor, task: &TaskFacts<'_>) -> bool {
    actor.role.at_least(Role::Manager) && can_view_task(actor, task)
}

pub fn can_delete_task(actor: &Actor, task: &TaskFacts<'_>) -> bool {
    actor.is_admin() || task.created_by == actor.user_id
}

/// Whether `actor` may add `assignee` to the task.
pub fn can_assign(actor: &Actor, task: &TaskFacts<'_>, assignee: &Profile) -> bool {
    if actor.is_admin() {
        return true;
    }
    if !can_view_task(actor, task) {
        return false;
    }
    match actor.role {
        Role::Manager => {
            assignee.id == actor.user_id
                || (actor.department_id.is_some() && assignee.department_id == actor.department_id)
        }
        _ => assignee.id == actor.user_id,
    }
}

/// Assignees may drop themselves; managers and admins may drop anyone they could assign.
pub fn can_unassign(actor: &Actor, task: &TaskFacts<'_>, assignee_id: Uuid) -> bool {
    if assignee_id == actor.user_id {
        return true;
    }
    actor.is_admin() || (actor.role == Role::Manager && can_view_task(actor, task))
}

pub fn can_delete_comment(actor: &Actor, author_id: Uuid) -> bool {
    actor.is_admin() || author_id == actor.user_id
}

/// Projects without a department are visible to everyone.
pub fn can_view_project(actor: &Actor, project_department: Option<Uuid>) -> bool {
    actor.is_admin() || project_department.is_none() || project_department == actor.department_id
}

pub fn can_manage_project(actor: &Actor, project_department: Option<Uuid>) -> bool {
    actor.is_admin() || actor.manages(project_department)
}

/// Managers and admins may look at someone else's schedule.
pub fn can_view_schedule_of(actor: &Actor, user_id: Uuid) -> bool {
    user_id == actor.user_id || actor.role.at_least(Role::Manager)
}

/// Bind parameters that reproduce [`can_view_task`] inside a SQL `WHERE` clause.
///
/// ```sql
/// ($1 OR t.created_by = $2
///     OR EXISTS (SELECT 1 FROM task_assignees a WHERE a.task_id = t.id AND a.user_id = $2)
///     OR ($3::uuid IS NOT NULL AND t.department_id = $3))
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskScope {
    pub see_all: bool,
    pub user_id: Uuid,
    pub managed_department_id: Option<Uuid>,
}

impl TaskScope {
    pub fn for_actor(actor: &Actor) -> Self {
        let managed_department_id = match actor.role {
            Role::Manager => actor.department_id,
            _ => None,
        };
        Self {
            see_all: actor.is_admin(),
            user_id: actor.user_id,
            managed_department_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn actor(role: Role, department_id: Option<Uuid>) -> Actor {
        Actor {
            user_id: Uuid::new_v4(),
            role,
            department_id,
        }
    }

    fn profile(id: Uuid, department_id: Option<Uuid>) -> Profile {
        Profile {
            id,
            email: format!("{id}@example.com"),
            display_name: None,
            role: Role::Staff,
            department_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn staff_sees_only_own_or_assigned_tasks() {
        let dept = Some(Uuid::new_v4());
        let staff = actor(Role::Staff, dept);
        let stranger = Uuid::new_v4();

        let created = TaskFacts {
            created_by: staff.user_id,
            department_id: dept,
            assignee_ids: &[],
        };
        assert!(can_view_task(&staff, &created));

        let assignees = [staff.user_id];
        let assigned = TaskFacts {
            created_by: stranger,
            department_id: None,
            assignee_ids: &assignees,
        };
        assert!(can_view_task(&staff, &assigned));

        let same_department = TaskFacts {
            created_by: stranger,
            department_id: dept,
            assignee_ids: &[],
        };
        assert!(!can_view_task(&staff, &same_department));
    }

    #[test]
    fn manager_sees_department_tasks_only() {
        let dept = Some(Uuid::new_v4());
        let manager = actor(Role::Manager, dept);
        let stranger = Uuid::new_v4();

        let in_department = TaskFacts {
            created_by: stranger,
            department_id: dept,
            assignee_ids: &[],
        };
        assert!(can_view_task(&manager, &in_department));
        assert!(can_archive_task(&manager, &in_department));

        let elsewhere = TaskFacts {
            created_by: stranger,
            department_id: Some(Uuid::new_v4()),
            assignee_ids: &[],
        };
        assert!(!can_view_task(&manager, &elsewhere));
        assert!(!can_archive_task(&manager, &elsewhere));
    }

    #[test]
    fn manager_without_department_does_not_match_unassigned_tasks() {
        let manager = actor(Role::Manager, None);
        let task = TaskFacts {
            created_by: Uuid::new_v4(),
            department_id: None,
            assignee_ids: &[],
        };
        assert!(!can_view_task(&manager, &task));
    }

    #[test]
    fn admin_sees_and_archives_everything() {
        let admin = actor(Role::Admin, None);
        let task = TaskFacts {
            created_by: Uuid::new_v4(),
            department_id: Some(Uuid::new_v4()),
            assignee_ids: &[],
        };
        assert!(can_view_task(&admin, &task));
        assert!(can_archive_task(&admin, &task));
        assert!(can_delete_task(&admin, &task));
    }

    #[test]
    fn staff_cannot_archive_even_own_tasks() {
        let staff = actor(Role::Staff, None);
        let task = TaskFacts {
            created_by: staff.user_id,
            department_id: None,
            assignee_ids: &[],
        };
        assert!(!can_archive_task(&staff, &task));
        assert!(can_delete_task(&staff, &task));
    }

    #[test]
    fn staff_may_only_assign_themselves() {
        let staff = actor(Role::Staff, None);
        let task = TaskFacts {
            created_by: staff.user_id,
            department_id: None,
            assignee_ids: &[],
        };
        assert!(can_assign(&staff, &task, &profile(staff.user_id, None)));
        assert!(!can_assign(&staff, &task, &profile(Uuid::new_v4(), None)));
    }

    #[test]
    fn manager_assigns_within_department() {
        let dept = Some(Uuid::new_v4());
        let manager = actor(Role::Manager, dept);
        let task = TaskFacts {
            created_by: Uuid::new_v4(),
            department_id: dept,
            assignee_ids: &[],
        };
        assert!(can_assign(&manager, &task, &profile(Uuid::new_v4(), dept)));
        assert!(!can_assign(
            &manager,
            &task,
            &profile(Uuid::new_v4(), Some(Uuid::new_v4()))
        ));
    }

    #[test]
    fn assignee_can_unassign_self() {
        let staff = actor(Role::Staff, None);
        let assignees = [staff.user_id];
        let task = TaskFacts {
            created_by: Uuid::new_v4(),
            department_id: None,
            assignee_ids: &assignees,
        };
        assert!(can_unassign(&staff, &task, staff.user_id));
        assert!(!can_unassign(&staff, &task, Uuid::new_v4()));
    }

    #[test]
    fn project_visibility_and_management() {
        let dept = Some(Uuid::new_v4());
        let staff = actor(Role::Staff, dept);
        let manager = actor(Role::Manager, dept);

        assert!(can_view_project(&staff, None));
        assert!(can_view_project(&staff, dept));
        assert!(!can_view_project(&staff, Some(Uuid::new_v4())));

        assert!(!can_manage_project(&staff, dept));
        assert!(can_manage_project(&manager, dept));
        assert!(!can_manage_project(&manager, None));
    }

    #[test]
    fn scope_mirrors_roles() {
        let dept = Some(Uuid::new_v4());
        let admin = TaskScope::for_actor(&actor(Role::Admin, dept));
        assert!(admin.see_all);

        let manager = TaskScope::for_actor(&actor(Role::Manager, dept));
        assert!(!manager.see_all);
        assert_eq!(manager.managed_department_id, dept);

        let staff = TaskScope::for_actor(&actor(Role::Staff, dept));
        assert!(!staff.see_all);
        assert_eq!(staff.managed_department_id, None);
    }

    #[test]
    fn schedule_of_others_requires_manager() {
        let staff = actor(Role::Staff, None);
        assert!(can_view_schedule_of(&staff, staff.user_id));
        assert!(!can_view_schedule_of(&staff, Uuid::new_v4()));
        assert!(can_view_schedule_of(
            &actor(Role::Manager, None),
            Uuid::new_v4()
        ));
    }
}
