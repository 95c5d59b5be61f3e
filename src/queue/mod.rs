pub mod manager;

pub use manager::{
    DownloadTask, NewTask, Subscription, TaskQueue, TaskStatus, TaskUpdate, DEFAULT_MAX_RETRIES,
};
