pub mod hub;
pub mod query;
pub mod sessions;
pub mod ticker;

pub use hub::{EventHub, HubConfig, HubSubscription, PublishReport, SubscriberId};
pub use query::{
    QueryConfig, QueryService, TimeseriesRequest, TimeseriesResponse, TransfersResponse,
};
pub use sessions::{SessionId, SessionInfo, SessionManager, SessionState, SessionStream};
pub use ticker::{TickConfig, TickSource};
