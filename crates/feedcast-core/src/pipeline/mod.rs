mod dispatcher;
mod poller;
mod supervisor;

pub use dispatcher::{DispatchReport, Dispatcher};
pub use poller::FeedPoller;
pub use supervisor::{wait_for_shutdown, Supervisor};
