mod payment;
mod plan;
mod subscription;
mod user;
mod voucher;

pub use payment::*;
pub use plan::*;
pub use subscription::*;
pub use user::*;
pub use voucher::*;
