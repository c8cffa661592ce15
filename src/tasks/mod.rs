pub(crate) mod queues;
pub(crate) mod scheduler;
