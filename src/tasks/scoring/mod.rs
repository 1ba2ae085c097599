mod maintenance;
mod worker;

pub(crate) use maintenance::close_expired_attempts;
pub(crate) use worker::{claim_next_ungraded_attempt, process_attempt};
