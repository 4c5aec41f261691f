use hyper::{Body, Method, StatusCode};
use std::{
    mem,
    sync::Arc,
    time::Instant,
};

use crate::{
    api,
    auth::{self, AuthContext},
    db::{self, Transaction},
    prelude::*,
};
use super::{Context, Request, Response, response};


/// This is the main HTTP entry point, called for each incoming request.
pub(super) async fn handle(req: Request<Body>, ctx: Arc<Context>) -> Response {
    trace!(
        "Incoming HTTP {:?} request to '{}{}'",
        req.method(),
        req.uri().path(),
        req.uri().query().map(|q| format!("?{}", q)).unwrap_or_default(),
    );
    if ctx.config.log.log_http_headers {
        let mut out = String::new();
        for (name, value) in req.headers() {
            out += &format!("\n  {}: {}", name, String::from_utf8_lossy(value.as_bytes()));
        }
        trace!("HTTP headers: {}", out);
    }

    let method = req.method().clone();
    let path = req.uri().path().trim_end_matches('/');

    match path {
        // The GraphQL endpoint. This is the only path for which POST is
        // allowed.
        "/graphql" if method == Method::POST => handle_api(req, &ctx).await,

        // Login and logout handlers, also POST only.
        "/~login" if method == Method::POST => {
            auth::handle_login(req, &ctx).await.unwrap_or_else(|r| r)
        }
        "/~logout" if method == Method::POST => auth::handle_logout(req, &ctx).await,

        // From this point on, we only support GET and HEAD requests. All others
        // will result in 405.
        _ if method != Method::GET && method != Method::HEAD => response::method_not_allowed(),

        // The interactive GraphQL API explorer/IDE. We keep this in production
        // as it does not hurt and in particular: does not expose any
        // information that isn't already exposed by the API itself.
        "/~graphiql" => graphiql(&ctx),

        "" => index(&ctx),

        _ => response::not_found(),
    }
}

/// Handles a request to `/graphql`.
async fn handle_api(req: Request<Body>, ctx: &Context) -> Response {
    let before = Instant::now();

    // Get a connection for this request.
    let mut connection = match db::get_conn_or_service_unavailable(&ctx.db_pool).await {
        Ok(c) => c,
        Err(r) => return r,
    };

    // Get the auth session before starting the transaction: a failed lookup
    // should not doom the API request.
    let auth = match AuthContext::new(req.headers(), &ctx.config.auth, &**connection).await {
        Ok(auth) => auth,
        Err(e) => {
            error!("DB error when resolving auth session: {}", e);
            return response::internal_server_error();
        }
    };
    trace!("User: {}", auth.debug_log_username());

    // Read the full request body.
    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to read GraphQL request body: {}", e);
            return response::bad_request(None);
        }
    };
    let gql_request = match serde_json::from_slice::<juniper::http::GraphQLBatchRequest>(&body) {
        Ok(req) => req,
        Err(e) => {
            debug!("Failed to deserialize GraphQL request: {}", e);
            return response::bad_request(Some("invalid GraphQL request body"));
        }
    };

    let tx = match connection.transaction().await {
        Ok(tx) => tx,
        Err(e) => {
            error!("Failed to start transaction for API request: {}", e);
            return response::internal_server_error();
        }
    };

    // Okay, lets take a deep breath.
    //
    // Unfortunately, `juniper` does not support contexts with a lifetime
    // parameter. However, we'd like to have one SQL transaction per API
    // request. The transaction type (`deadpool_postgres::Transaction`) borrows
    // from the DB connection (`tokio_postgres::Client`) and thus has a
    // lifetime parameter. This makes sense for the API of that library since
    // it statically prevents a number of logic bugs. But it is inconvenient
    // for us.
    //
    // Unfortunately, we think the best solution for us is to use `unsafe` here
    // to just get rid of the lifetime parameter. We can pretend that the
    // lifetime is `'static`. Of course, we then have to make sure that the
    // transaction does not outlive the borrowed connection. We do that by
    // putting the transaction into an `Arc`. That way we can check whether
    // there still exists a reference after calling the API handlers. The
    // transaction is not `Clone` and `Arc` only gives an immutable reference
    // to the underlying value. So even a buggy handler could not move the
    // transaction out of the `Arc`.
    //
    // Unfortunately, `connection` is not treated as borrowed after this unsafe
    // block. So we must make sure not to access it at all until we get rid of
    // the transaction (by committing it below).
    type PgTx<'a> = deadpool_postgres::Transaction<'a>;
    let tx = unsafe {
        let static_tx = mem::transmute::<PgTx<'_>, PgTx<'static>>(tx);
        Arc::new(static_tx)
    };

    let api_context = Arc::new(api::Context {
        db: Transaction::new(tx.clone()),
        auth,
        config: ctx.config.clone(),
    });
    let gql_response = gql_request.execute(&*ctx.api_root, &*api_context).await;
    let status = if gql_response.is_ok() { StatusCode::OK } else { StatusCode::BAD_REQUEST };
    let out = match serde_json::to_string(&gql_response) {
        Ok(json) => Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Body::from(json))
            .unwrap(),
        Err(e) => {
            error!("Failed to serialize GraphQL response: {}", e);
            response::internal_server_error()
        }
    };
    drop(gql_response);
    let num_queries = api_context.db.num_queries();
    drop(api_context);

    // Check whether we own the last remaining handle of this Arc.
    let out = match Arc::try_unwrap(tx) {
        Err(_) => {
            // There are still other handles, meaning that the API handler
            // incorrectly stored the transaction in some static variable. This
            // is our fault and should NEVER happen. If it does happen, we
            // would have UB after this function exits. We can't have that. And
            // since panicking only brings down the current thread, we have to
            // reach for more drastic measures.
            error!("FATAL BUG: API handler kept reference to transaction. Ending process.");
            std::process::abort();
        }
        Ok(tx) => {
            match tx.commit().await {
                // If the transaction succeeded we can return the generated
                // response.
                Ok(_) => out,

                Err(e) => {
                    error!("Failed to commit transaction for API request: {}", e);
                    response::service_unavailable()
                }
            }
        }
    };

    debug!(
        "Finished /graphql query in {:.2?} (with {} SQL queries)",
        before.elapsed(),
        num_queries,
    );

    out
}

/// Serves the interactive GraphQL explorer.
fn graphiql(ctx: &Context) -> Response {
    let html = juniper::http::graphiql::graphiql_source("/graphql", None)
        .replace("<title>GraphiQL</title>", &format!(
            "<title>GraphiQL – {}</title>",
            ctx.config.general.site_title,
        ));

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/html; charset=UTF-8")
        .body(html.into())
        .unwrap()
}

/// A minimal index page. Agora is an API server; there is no frontend to serve
/// here.
fn index(ctx: &Context) -> Response {
    let body = format!(
        "{} – Agora backend\n\nAPI endpoint: POST /graphql\nAPI explorer: GET /~graphiql\n",
        ctx.config.general.site_title,
    );
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain; charset=UTF-8")
        .body(body.into())
        .unwrap()
}
