pub mod context;
pub mod server;
pub mod shell;

pub use context::{AppContext, TenantContextView};
pub use server::serve;
pub use shell::{ApiRequest, ApiResponse, Method, RequestShell};
