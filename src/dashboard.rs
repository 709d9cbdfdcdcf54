use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tower_http::cors::CorsLayer;

use crate::{config::Settings, store::SqliteStore, utils::now_ts};

#[derive(Clone)]
pub struct DashboardState {
    pub settings: Settings,
    pub store: SqliteStore,
}

pub async fn serve_dashboard(settings: Settings, store: SqliteStore) -> Result<()> {
    let state = DashboardState {
        settings: settings.clone(),
        store,
    };

    let app = Router::new()
        .route("/", get(index))
        .route("/api/health", get(api_health))
        .route("/api/status", get(api_status))
        .route("/api/orders", get(api_orders))
        .route("/api/fills", get(api_fills))
        .route("/api/merges", get(api_merges))
        .route("/api/scan", get(api_scan))
        .route("/api/history", get(api_history))
        .route("/api/summaries", get(api_summaries))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", settings.dashboard_host, settings.dashboard_port)
        .parse()
        .context("dashboard addr parse")?;

    log::info!("dashboard.start url=http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn to_response(res: Result<JsonValue>) -> axum::response::Response {
    match res {
        Ok(v) => Json(v).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn api_health() -> impl IntoResponse {
    Json(serde_json::json!({"ok": true}))
}

async fn api_status(State(st): State<DashboardState>) -> impl IntoResponse {
    to_response(st.store.fetch_runtime_statuses())
}

async fn api_orders(State(st): State<DashboardState>) -> impl IntoResponse {
    to_response(
        st.store
            .fetch_recent_orders(200)
            .map(|rows| serde_json::json!({ "orders": rows })),
    )
}

async fn api_fills(State(st): State<DashboardState>) -> impl IntoResponse {
    to_response(
        st.store
            .fetch_recent_fills(200)
            .map(|rows| serde_json::json!({ "fills": rows })),
    )
}

async fn api_merges(State(st): State<DashboardState>) -> impl IntoResponse {
    to_response(
        st.store
            .fetch_recent_merges(100)
            .map(|rows| serde_json::json!({ "merges": rows })),
    )
}

async fn api_scan(State(st): State<DashboardState>) -> impl IntoResponse {
    to_response(
        st.store
            .fetch_latest_scan(100)
            .map(|rows| serde_json::json!({ "opportunities": rows })),
    )
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    hours: Option<f64>,
}

async fn api_history(
    State(st): State<DashboardState>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    let now = now_ts();
    let hours = params.hours.unwrap_or(24.0).clamp(0.0, 24.0 * 30.0);
    to_response(
        st.store
            .scan_history(now - hours * 3600.0, now)
            .map(|rows| serde_json::json!({ "scans": rows })),
    )
}

async fn api_summaries(State(st): State<DashboardState>) -> impl IntoResponse {
    to_response(
        st.store
            .fetch_daily_summaries(60)
            .map(|rows| serde_json::json!({ "summaries": rows })),
    )
}

async fn index(State(st): State<DashboardState>) -> impl IntoResponse {
    Html(render_index_html(&st.settings.run_mode, st.store.path()))
}

// Single-file UI, no build step: fetches the JSON endpoints and renders
// plain tables.
fn render_index_html(mode: &str, sqlite_path: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>rewardscout</title>
    <style>
      body {{ font-family: ui-sans-serif, system-ui, sans-serif; margin: 24px; color: #222; }}
      h1 {{ font-size: 20px; }}
      .meta {{ color: #666; font-size: 12px; margin-bottom: 16px; }}
      table {{ border-collapse: collapse; margin: 12px 0 24px; font-size: 13px; }}
      th, td {{ border: 1px solid #ddd; padding: 4px 8px; text-align: right; }}
      th:first-child, td:first-child {{ text-align: left; }}
      caption {{ text-align: left; font-weight: 600; padding: 4px 0; }}
    </style>
  </head>
  <body>
    <h1>rewardscout</h1>
    <div class="meta">mode: {mode} &middot; sqlite: {sqlite_path}</div>
    <table id="scan"><caption>Latest scan</caption></table>
    <table id="orders"><caption>Recent orders</caption></table>
    <table id="merges"><caption>Recent merges</caption></table>
    <table id="summaries"><caption>Daily summaries</caption></table>
    <script>
      function render(id, rows) {{
        const el = document.getElementById(id);
        if (!rows || !rows.length) return;
        const cols = Object.keys(rows[0]);
        let html = '<tr>' + cols.map(c => '<th>' + c + '</th>').join('') + '</tr>';
        for (const r of rows) {{
          html += '<tr>' + cols.map(c => '<td>' + (typeof r[c] === 'number' ? r[c].toFixed ? +r[c].toFixed(4) : r[c] : r[c]) + '</td>').join('') + '</tr>';
        }}
        el.innerHTML += html;
      }}
      async function load() {{
        const scan = await (await fetch('/api/scan')).json();
        render('scan', scan.opportunities);
        const orders = await (await fetch('/api/orders')).json();
        render('orders', orders.orders.slice(0, 30));
        const merges = await (await fetch('/api/merges')).json();
        render('merges', merges.merges.slice(0, 30));
        const summaries = await (await fetch('/api/summaries')).json();
        render('summaries', summaries.summaries);
      }}
      load();
    </script>
  </body>
</html>"#
    )
}
