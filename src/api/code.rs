use axum::{extract::State, routing::post, Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::db::models::User;
use crate::sandbox::Language;
use crate::schemas::code::{
    ExecuteCodeRequest, ExecuteCodeResponse, TestCodeRequest, TestCodeResponse,
};

const RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/execute", post(execute_code)).route("/test", post(test_code))
}

async fn execute_code(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ExecuteCodeRequest>,
) -> Result<Json<ExecuteCodeResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let language = parse_language(&payload.language)?;
    enforce_rate_limit(&state, &user).await?;

    let outcome = state.services().judge.execute(&payload.code, language, &payload.input).await;
    Ok(Json(outcome.into()))
}

async fn test_code(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<TestCodeRequest>,
) -> Result<Json<TestCodeResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let language = parse_language(&payload.language)?;
    enforce_rate_limit(&state, &user).await?;

    let report =
        state.services().judge.run_cases(&payload.code, language, &payload.test_cases).await;
    Ok(Json(report.into()))
}

fn parse_language(value: &str) -> Result<Language, ApiError> {
    Language::parse(value).map_err(|err| ApiError::BadRequest(err.to_string()))
}

/// Redis errors fail open; the sandbox has its own per-run limits.
async fn enforce_rate_limit(state: &AppState, user: &User) -> Result<(), ApiError> {
    let limit = state.settings().attempt().code_rate_limit_per_minute;
    let key = format!("code:{}", user.id);
    match state.redis().rate_limit(&key, limit, RATE_LIMIT_WINDOW_SECONDS).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::warn!(user_id = %user.id, limit, "Code execution rate limit exceeded");
            Err(ApiError::TooManyRequests("Too many code runs, try again in a minute"))
        }
        Err(err) => {
            tracing::warn!(error = %err, "Rate limiter unavailable; allowing request");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::test_support::{self, ScriptedRunner, TestContext};

    async fn post(ctx: &TestContext, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let token = ctx.token("s1");
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(Method::POST, uri, Some(&token), Some(body)))
            .await
            .expect("response");
        let status = response.status();
        (status, test_support::read_json(response).await)
    }

    #[tokio::test]
    async fn execute_returns_the_run_outcome() {
        let ctx = TestContext::new().await;
        ctx.seed_student("s1");

        let (status, body) = post(
            &ctx,
            "/api/v1/code/execute",
            json!({ "code": "print(input())", "language": "python", "input": "hello" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "hello");
        assert_eq!(body["timed_out"], false);
    }

    #[tokio::test]
    async fn unsupported_language_is_a_bad_request() {
        let ctx = TestContext::new().await;
        ctx.seed_student("s1");

        let (status, body) = post(
            &ctx,
            "/api/v1/code/execute",
            json!({ "code": "puts 1", "language": "ruby" }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "unsupported language: ruby");
    }

    #[tokio::test]
    async fn test_endpoint_reports_every_case_in_order() {
        let ctx = TestContext::with_runner(ScriptedRunner::echo().timing_out_on("loop")).await;
        ctx.seed_student("s1");

        let (status, body) = post(
            &ctx,
            "/api/v1/code/test",
            json!({
                "code": "print(input())",
                "language": "js",
                "test_cases": [
                    { "input": "1", "expected_output": "1\n" },
                    { "input": "loop", "expected_output": "loop" },
                    { "input": "3", "expected_output": "4" }
                ]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["passed_count"], 1);
        assert_eq!(body["total_test_cases"], 3);
        assert_eq!(body["all_passed"], false);
        assert_eq!(body["results"][1]["timed_out"], true);
        assert_eq!(body["results"][2]["index"], 2);
    }

    #[tokio::test]
    async fn empty_test_case_list_is_rejected() {
        let ctx = TestContext::new().await;
        ctx.seed_student("s1");

        let (status, _) = post(
            &ctx,
            "/api/v1/code/test",
            json!({ "code": "print(1)", "language": "python", "test_cases": [] }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
