use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::generation::circuit_breaker::CircuitPhase;
use crate::state::AppState;

/// GET /health
/// Returns service status plus the text-provider circuit state.
/// An open circuit reports `degraded`: text requests are being served from fallbacks or refused.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let circuit = state.generation.breaker().snapshot();
    let status = match circuit.phase {
        CircuitPhase::Closed => "ok",
        CircuitPhase::Open | CircuitPhase::HalfOpen => "degraded",
    };

    Json(json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "service": "hire-api",
        "circuit": {
            "phase": circuit.phase,
            "consecutive_failures": circuit.consecutive_failures
        }
    }))
}
