#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Changed {
    Yes,
    No,
}

/// Stores `new` if it differs from `value`, handing back the value it replaced.
///
/// Used where a transition is reported as "old -> new".
#[must_use = "the replaced value is the only record of the transition"]
pub fn replace_changed<T: PartialEq>(value: &mut T, new: T) -> Option<T> {
    if *value == new {
        None
    } else {
        Some(std::mem::replace(value, new))
    }
}

#[must_use = "checked_set is useless if the result of the check is not required"]
pub fn checked_set<T: PartialEq>(value: &mut T, new: T) -> Changed {
    match replace_changed(value, new) {
        Some(_) => Changed::Yes,
        None => Changed::No,
    }
}
