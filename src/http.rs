//! HTTP API for the chain ledger
//!
//! All routes except `/health` require `Authorization: Bearer <jwt>`; the
//! token subject is the acting user.
//!
//! ## Credits
//! - `GET /credits/balance` - caller's balance
//! - `GET /credits/transactions?limit&offset&source&kind` - caller's ledger, newest first
//! - `POST /credits/award` - record an earned entry for the caller
//! - `POST /credits/spend` - record a spent entry (402 when the balance is short)
//! - `POST /credits/reconcile` - rebuild the caller's balance from the log
//!
//! ## Chains
//! - `POST /requests` - create a request (caller is the creator)
//! - `GET /requests/{id}` - request, chain state, participants, likes
//! - `GET /requests/{id}/access` - whether the caller unlocked/liked the chain
//! - `GET /requests/{id}/claims` - claim history
//! - `POST /requests/{id}/claims` - claim to be the target
//! - `POST /claims/{id}/resolve` - approve or reject (creator only)
//! - `POST /chains/join`, `POST /chains/unlock`, `POST /chains/like`
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST -H "Authorization: Bearer $TOKEN" \
//!      -d '{"request_id": "..."}' http://localhost:8095/chains/join
//! ```

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::AUTHORIZATION;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::auth::{authenticate, Identity, JwtValidator};
use crate::db::connection_requests::CreateRequestInput;
use crate::db::credit_transactions::TransactionQuery;
use crate::db::target_claims::ClaimDetails;
use crate::error::{LedgerError, LedgerResult};
use crate::services::response::{error_response, from_create_result, from_result, not_found};
use crate::services::{CreditInput, JoinInput, LikeInput, ResolveInput, Services, UnlockInput};

/// Run database work off the async runtime
async fn blocking<T, F>(f: F) -> LedgerResult<T>
where
    F: FnOnce() -> LedgerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LedgerError::Internal(format!("Blocking task failed: {}", e)))?
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> LedgerResult<T> {
    Ok(serde_json::from_slice(body)?)
}

fn parse_query<T: DeserializeOwned>(query: Option<&str>) -> LedgerResult<T> {
    serde_urlencoded::from_str(query.unwrap_or(""))
        .map_err(|e| LedgerError::Validation(format!("Invalid query string: {}", e)))
}

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    validator: JwtValidator,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(services: Arc<Services>, validator: JwtValidator, bind_addr: SocketAddr) -> Self {
        Self {
            services,
            validator,
            bind_addr,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), LedgerError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    async fn handle_request(&self, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);
        let auth = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        debug!(method = %method, path = %path, "Incoming request");

        let body = req.into_body().collect().await?.to_bytes();
        Ok(self.dispatch(method, &path, query.as_deref(), auth.as_deref(), body).await)
    }

    /// Route a fully read request
    pub async fn dispatch(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        auth: Option<&str>,
        body: Bytes,
    ) -> Response<Full<Bytes>> {
        if method == Method::GET && path == "/health" {
            return self.handle_health().await;
        }

        let identity = match authenticate(&self.validator, auth) {
            Ok(identity) => identity,
            Err(e) => return error_response(e),
        };

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match (method, segments.as_slice()) {
            // Credits
            (Method::GET, ["credits", "balance"]) => {
                let ledger = self.services.ledger.clone();
                from_result(blocking(move || ledger.get_balance(&identity.user_id)).await)
            }
            (Method::GET, ["credits", "transactions"]) => {
                let ledger = self.services.ledger.clone();
                let result = match parse_query::<TransactionQuery>(query) {
                    Ok(q) => blocking(move || ledger.list_transactions(&identity.user_id, &q)).await,
                    Err(e) => Err(e),
                };
                from_result(result)
            }
            (Method::POST, ["credits", "award"]) => {
                let ledger = self.services.ledger.clone();
                from_create_result(self.with_body(&body, identity, move |id, input: CreditInput| {
                    ledger.award_credits(&id.user_id, &input)
                })
                .await)
            }
            (Method::POST, ["credits", "spend"]) => {
                let ledger = self.services.ledger.clone();
                from_create_result(self.with_body(&body, identity, move |id, input: CreditInput| {
                    ledger.spend_credits(&id.user_id, &input)
                })
                .await)
            }
            (Method::POST, ["credits", "reconcile"]) => {
                let ledger = self.services.ledger.clone();
                from_result(blocking(move || ledger.reconcile_balance(&identity.user_id)).await)
            }

            // Requests and claims
            (Method::POST, ["requests"]) => {
                let chains = self.services.chains.clone();
                from_create_result(self.with_body(&body, identity, move |id, input: CreateRequestInput| {
                    chains.create_request(&id.user_id, &input)
                })
                .await)
            }
            (Method::GET, ["requests", request_id]) => {
                let chains = self.services.chains.clone();
                let request_id = request_id.to_string();
                from_result(blocking(move || chains.get_request(&request_id)).await)
            }
            (Method::GET, ["requests", request_id, "access"]) => {
                let gate = self.services.gate.clone();
                let request_id = request_id.to_string();
                from_result(blocking(move || gate.access(&identity.user_id, &request_id)).await)
            }
            (Method::GET, ["requests", request_id, "claims"]) => {
                let chains = self.services.chains.clone();
                let request_id = request_id.to_string();
                from_result(blocking(move || chains.list_claims(&identity.user_id, &request_id)).await)
            }
            (Method::POST, ["requests", request_id, "claims"]) => {
                let chains = self.services.chains.clone();
                let request_id = request_id.to_string();
                from_create_result(self.with_body(&body, identity, move |id, details: ClaimDetails| {
                    chains.submit_claim(&id.user_id, &request_id, &details)
                })
                .await)
            }
            (Method::POST, ["claims", claim_id, "resolve"]) => {
                let chains = self.services.chains.clone();
                let claim_id = claim_id.to_string();
                from_result(self.with_body(&body, identity, move |id, input: ResolveInput| {
                    chains.resolve_claim(&id.user_id, &claim_id, &input)
                })
                .await)
            }

            // Chain actions
            (Method::POST, ["chains", "join"]) => {
                let chains = self.services.chains.clone();
                from_result(self.with_body(&body, identity, move |id, input: JoinInput| {
                    chains.join_chain(&id.user_id, id.name.as_deref(), &input)
                })
                .await)
            }
            (Method::POST, ["chains", "unlock"]) => {
                let gate = self.services.gate.clone();
                from_create_result(self.with_body(&body, identity, move |id, input: UnlockInput| {
                    gate.unlock_chain(&id.user_id, &input)
                })
                .await)
            }
            (Method::POST, ["chains", "like"]) => {
                let gate = self.services.gate.clone();
                from_result(self.with_body(&body, identity, move |id, input: LikeInput| {
                    gate.toggle_like(&id.user_id, &input)
                })
                .await)
            }

            _ => not_found("Not Found"),
        }
    }

    /// Parse the JSON body, then run `f` on the blocking pool
    async fn with_body<I, T, F>(&self, body: &Bytes, identity: Identity, f: F) -> LedgerResult<T>
    where
        I: DeserializeOwned + Send + 'static,
        T: Send + 'static,
        F: FnOnce(Identity, I) -> LedgerResult<T> + Send + 'static,
    {
        let input: I = parse_body(body)?;
        blocking(move || f(identity, input)).await
    }

    /// Health check endpoint
    async fn handle_health(&self) -> Response<Full<Bytes>> {
        let db = self.services.db.clone();
        match blocking(move || db.stats()).await {
            Ok(stats) => from_result::<serde_json::Value>(Ok(serde_json::json!({
                "status": "ok",
                "transactions": stats.transaction_count,
                "accounts": stats.account_count,
                "requests": stats.request_count,
                "pending_claims": stats.pending_claims,
            }))),
            Err(e) => error_response(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::LedgerDb;
    use hyper::StatusCode;

    fn server() -> HttpServer {
        let db = Arc::new(LedgerDb::open_in_memory().unwrap());
        let services = Arc::new(Services::new(db, &Config::default()));
        HttpServer::new(services, JwtValidator::new_dev(), "127.0.0.1:0".parse().unwrap())
    }

    fn bearer(user: &str) -> String {
        format!("Bearer {}", JwtValidator::new_dev().generate_token(user, None).unwrap())
    }

    async fn json(resp: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let resp = server().dispatch(Method::GET, "/health", None, None, Bytes::new()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let resp = server()
            .dispatch(Method::GET, "/credits/balance", None, None, Bytes::new())
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(resp).await["kind"], "unauthorized");
    }

    #[tokio::test]
    async fn test_request_join_and_balance() {
        let server = server();
        let alice = bearer("alice");
        let bob = bearer("bob");

        let resp = server
            .dispatch(
                Method::POST,
                "/requests",
                None,
                Some(&bob),
                Bytes::from(r#"{"target": "A founder in Lagos", "reward": 30}"#),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let request_id = json(resp).await["id"].as_str().unwrap().to_string();

        let body = serde_json::json!({ "request_id": request_id }).to_string();
        let resp = server
            .dispatch(Method::POST, "/chains/join", None, Some(&alice), Bytes::from(body))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let outcome = json(resp).await;
        assert_eq!(outcome["creator_award"]["status"], "posted");

        let resp = server
            .dispatch(Method::GET, "/credits/balance", None, Some(&alice), Bytes::new())
            .await;
        assert_eq!(json(resp).await["total_credits"], 2);

        let resp = server
            .dispatch(Method::GET, &format!("/requests/{}", request_id), None, Some(&alice), Bytes::new())
            .await;
        let view = json(resp).await;
        assert_eq!(view["chain_length"], 2);
        assert_eq!(view["state"], "active");
    }

    #[tokio::test]
    async fn test_award_keys_do_not_block_joins_or_payouts() {
        let server = server();
        let bob = bearer("bob");
        let carol = bearer("carol");
        let mallory = bearer("mallory");

        let resp = server
            .dispatch(
                Method::POST,
                "/requests",
                None,
                Some(&bob),
                Bytes::from(r#"{"target": "A ceramicist in Kyoto", "reward": 10}"#),
            )
            .await;
        let request_id = json(resp).await["id"].as_str().unwrap().to_string();

        for key in [format!("join_chain:{}:carol", request_id), format!("chain_reward:{}:bob", request_id)] {
            let body = serde_json::json!({
                "amount": 1, "source": "bonus", "description": "squat", "idempotency_key": key,
            });
            let resp = server
                .dispatch(Method::POST, "/credits/award", None, Some(&mallory), Bytes::from(body.to_string()))
                .await;
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let join = serde_json::json!({ "request_id": request_id }).to_string();
        let resp = server
            .dispatch(Method::POST, "/chains/join", None, Some(&carol), Bytes::from(join))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let claim = serde_json::json!({ "contact_name": "Dana", "contact_email": "dana@example.org" }).to_string();
        let resp = server
            .dispatch(
                Method::POST,
                &format!("/requests/{}/claims", request_id),
                None,
                Some(&bearer("dana")),
                Bytes::from(claim),
            )
            .await;
        let claim_id = json(resp).await["id"].as_str().unwrap().to_string();

        let resp = server
            .dispatch(
                Method::POST,
                &format!("/claims/{}/resolve", claim_id),
                None,
                Some(&bob),
                Bytes::from(r#"{"decision": "approve"}"#),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let outcome = json(resp).await;
        assert_eq!(outcome["request_status"], "completed");
        let paid: i64 = outcome["payouts"].as_array().unwrap().iter().map(|t| t["amount"].as_i64().unwrap()).sum();
        assert_eq!(paid, 10);
    }

    #[tokio::test]
    async fn test_overspend_is_402() {
        let server = server();
        let resp = server
            .dispatch(
                Method::POST,
                "/credits/spend",
                None,
                Some(&bearer("carol")),
                Bytes::from(r#"{"amount": 10, "source": "unlock_chain", "description": "unlock"}"#),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
        let body = json(resp).await;
        assert_eq!(body["kind"], "insufficient_credits");
        assert_eq!(body["available"], 0);
    }

    #[tokio::test]
    async fn test_bad_json_is_400() {
        let resp = server()
            .dispatch(Method::POST, "/chains/like", None, Some(&bearer("carol")), Bytes::from("{"))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_transactions_query() {
        let server = server();
        let resp = server
            .dispatch(
                Method::GET,
                "/credits/transactions",
                Some("limit=5&offset=0"),
                Some(&bearer("dave")),
                Bytes::new(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json(resp).await, serde_json::json!([]));
    }
}
