//! axum 中间件
//!
//! 用法：
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/api/orders", post(create_order))
//!     .layer(axum::middleware::from_fn_with_state(guard, replay_protection));
//! ```
//!
//! 拒绝时返回 JSON：`{"error": "...", "code": "RP-004", "status": 409}`，
//! 后续处理器不会执行。

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::guard::{ReplayGuard, Verdict};

/// 防重放中间件
pub async fn replay_protection(
    State(guard): State<ReplayGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    match guard.check(&mut request).await {
        Ok(Verdict::Accept) => next.run(request).await,
        Ok(Verdict::Reject(rejection)) => rejection.into_response(),
        Err(e) => e.into_response(),
    }
}
