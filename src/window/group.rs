use std::cmp::Ordering;

use crate::utils::id::define_id;
use crate::utils::timestamp_compare;
use crate::window::WindowId;

define_id!(GroupId);

/// X11 windows sharing a `WM_CLIENT_LEADER`.
#[derive(Debug)]
pub struct Group {
    pub id: GroupId,
    pub leader: u32,
    pub members: Vec<WindowId>,
    /// Newest user time among the members.
    pub user_time: Option<u32>,
    pub icon: Option<String>,
}

impl Group {
    pub fn new(leader: u32) -> Self {
        Self {
            id: GroupId::next(),
            leader,
            members: Vec::new(),
            user_time: None,
            icon: None,
        }
    }

    pub fn add_member(&mut self, window: WindowId) {
        if !self.members.contains(&window) {
            self.members.push(window);
        }
    }

    pub fn remove_member(&mut self, window: WindowId) {
        self.members.retain(|w| *w != window);
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn update_user_time(&mut self, time: u32) {
        let newer = match self.user_time {
            None => true,
            Some(current) => timestamp_compare(time, current) == Ordering::Greater,
        };
        if newer {
            self.user_time = Some(time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_user_time_only_moves_forward() {
        let mut group = Group::new(0x400001);
        group.update_user_time(100);
        group.update_user_time(50);
        assert_eq!(group.user_time, Some(100));
        group.update_user_time(150);
        assert_eq!(group.user_time, Some(150));
    }
}
