use actix_cors::Cors;
use actix_web::{
    delete, get, post, put, web, App, HttpResponse, HttpServer, Responder, Result as ActixResult,
};
use actix_ws::Message;
use loomcore::{CustomNodeEnvelope, EventBus, LoomError, NodeTemplate, WorkflowEnvelope};
use loomruntime::{
    CustomNodeDraft, ExecuteRequest, HttpRunner, LoomService, Orchestrator, SaveWorkflowRequest,
    Simulator, DEFAULT_RUNNER_TIMEOUT,
};
use loomstore::{Database, SortBy, SortOrder, WorkflowCategory, WorkflowQuery};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Application state shared across handlers
struct AppState {
    service: Arc<LoomService>,
    events: Arc<EventBus>,
}

fn error_response(err: &LoomError) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });
    match err {
        LoomError::NotFound(_) => HttpResponse::NotFound().json(body),
        LoomError::Validation(_) | LoomError::Graph(_) | LoomError::UnsupportedFormat(_) => {
            HttpResponse::BadRequest().json(body)
        }
        LoomError::NameCollision(_) => HttpResponse::Conflict().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "loom"
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListParams {
    search: Option<String>,
    /// Comma-separated tag list
    tags: Option<String>,
    category: WorkflowCategory,
    sort_by: SortBy,
    sort_order: SortOrder,
    limit: u32,
    offset: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            search: None,
            tags: None,
            category: WorkflowCategory::default(),
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
            limit: 0,
            offset: 0,
        }
    }
}

/// List workflows with filtering and pagination
#[get("/api/workflows")]
async fn list_workflows(
    data: web::Data<AppState>,
    params: web::Query<ListParams>,
) -> ActixResult<impl Responder> {
    let params = params.into_inner();
    let query = WorkflowQuery {
        search: params.search,
        tags: params
            .tags
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        category: params.category,
        sort_by: params.sort_by,
        sort_order: params.sort_order,
        limit: params.limit,
        offset: params.offset,
    };

    match data.service.list_workflows(&query) {
        Ok(page) => Ok(HttpResponse::Ok().json(page)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Create or update a workflow
#[post("/api/workflows")]
async fn save_workflow(
    data: web::Data<AppState>,
    body: web::Json<SaveWorkflowRequest>,
) -> ActixResult<impl Responder> {
    match data.service.save_workflow(body.into_inner()) {
        Ok(saved) if saved.created => Ok(HttpResponse::Created().json(saved)),
        Ok(saved) => Ok(HttpResponse::Ok().json(saved)),
        Err(e) => Ok(error_response(&e)),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GetParams {
    include_history: bool,
}

/// Fetch a workflow, optionally with its execution history
#[get("/api/workflows/{id}")]
async fn get_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<GetParams>,
) -> ActixResult<impl Responder> {
    match data
        .service
        .get_workflow(&path.into_inner(), params.include_history)
    {
        Ok(detail) => Ok(HttpResponse::Ok().json(detail)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Delete a workflow (history goes with it)
#[delete("/api/workflows/{id}")]
async fn delete_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    match data.service.delete_workflow(&path.into_inner()) {
        Ok(deleted) => Ok(HttpResponse::Ok().json(serde_json::json!({ "success": deleted }))),
        Err(e) => Ok(error_response(&e)),
    }
}

#[derive(Debug, Deserialize)]
struct DuplicateBody {
    name: String,
}

#[post("/api/workflows/{id}/duplicate")]
async fn duplicate_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<DuplicateBody>,
) -> ActixResult<impl Responder> {
    match data
        .service
        .duplicate_workflow(&path.into_inner(), &body.name)
    {
        Ok(copy) => Ok(HttpResponse::Created().json(serde_json::json!({ "id": copy.id }))),
        Err(e) => Ok(error_response(&e)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ExportParams {
    format: String,
    include_metadata: bool,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            include_metadata: true,
        }
    }
}

#[get("/api/workflows/{id}/export")]
async fn export_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<ExportParams>,
) -> ActixResult<impl Responder> {
    match data
        .service
        .export_workflow(&path.into_inner(), &params.format, params.include_metadata)
    {
        Ok(bundle) => Ok(HttpResponse::Ok().json(bundle)),
        Err(e) => Ok(error_response(&e)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportBody {
    envelope: WorkflowEnvelope,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    overwrite_metadata: bool,
}

#[post("/api/workflows/import")]
async fn import_workflow(
    data: web::Data<AppState>,
    body: web::Json<ImportBody>,
) -> ActixResult<impl Responder> {
    let body = body.into_inner();
    match data
        .service
        .import_workflow(body.envelope, body.name, body.overwrite_metadata)
    {
        Ok(imported) => Ok(HttpResponse::Created().json(imported)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Run a workflow; remote runtime failures degrade to the simulator and
/// never surface here.
#[post("/api/executions")]
async fn execute_workflow(
    data: web::Data<AppState>,
    body: web::Json<ExecuteRequest>,
) -> ActixResult<impl Responder> {
    match data.service.execute_workflow(body.into_inner()).await {
        Ok(report) => Ok(HttpResponse::Ok().json(report)),
        Err(e) => {
            error!("workflow execution rejected: {}", e);
            Ok(error_response(&e))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageParams {
    limit: u32,
    offset: u32,
}

#[get("/api/workflows/{id}/executions")]
async fn get_execution_history(
    data: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<PageParams>,
) -> ActixResult<impl Responder> {
    match data
        .service
        .get_execution_history(&path.into_inner(), params.limit, params.offset)
    {
        Ok(records) => Ok(HttpResponse::Ok().json(records)),
        Err(e) => Ok(error_response(&e)),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TemplateParams {
    category: Option<String>,
    search: Option<String>,
}

#[get("/api/node-templates")]
async fn get_node_templates(
    data: web::Data<AppState>,
    params: web::Query<TemplateParams>,
) -> ActixResult<impl Responder> {
    match data
        .service
        .get_node_templates(params.category.as_deref(), params.search.as_deref())
    {
        Ok(templates) => Ok(HttpResponse::Ok().json(templates)),
        Err(e) => Ok(error_response(&e)),
    }
}

#[post("/api/node-templates")]
async fn save_node_template(
    data: web::Data<AppState>,
    body: web::Json<NodeTemplate>,
) -> ActixResult<impl Responder> {
    match data.service.save_node_template(body.into_inner()) {
        Ok(template) => {
            Ok(HttpResponse::Created().json(serde_json::json!({ "id": template.id })))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

#[get("/api/custom-nodes")]
async fn list_custom_nodes(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    match data.service.list_custom_nodes() {
        Ok(nodes) => Ok(HttpResponse::Ok().json(nodes)),
        Err(e) => Ok(error_response(&e)),
    }
}

#[get("/api/custom-nodes/by-name/{name}")]
async fn get_custom_node_by_name(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let name = path.into_inner();
    match data.service.get_custom_node_by_name(&name) {
        Ok(Some(node)) => Ok(HttpResponse::Ok().json(node)),
        Ok(None) => Ok(error_response(&LoomError::NotFound(format!(
            "custom node '{name}'"
        )))),
        Err(e) => Ok(error_response(&e)),
    }
}

#[post("/api/custom-nodes")]
async fn create_custom_node(
    data: web::Data<AppState>,
    body: web::Json<CustomNodeDraft>,
) -> ActixResult<impl Responder> {
    match data.service.create_custom_node(body.into_inner()) {
        Ok(node) => Ok(HttpResponse::Created().json(node)),
        Err(e) => Ok(error_response(&e)),
    }
}

#[put("/api/custom-nodes/{id}")]
async fn update_custom_node(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CustomNodeDraft>,
) -> ActixResult<impl Responder> {
    match data
        .service
        .update_custom_node(&path.into_inner(), body.into_inner())
    {
        Ok(node) => Ok(HttpResponse::Ok().json(node)),
        Err(e) => Ok(error_response(&e)),
    }
}

#[delete("/api/custom-nodes/{id}")]
async fn delete_custom_node(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    match data.service.delete_custom_node(&path.into_inner()) {
        Ok(deleted) => Ok(HttpResponse::Ok().json(serde_json::json!({ "success": deleted }))),
        Err(e) => Ok(error_response(&e)),
    }
}

#[get("/api/custom-nodes/{id}/export")]
async fn export_custom_node(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    match data.service.export_custom_node(&path.into_inner()) {
        Ok(envelope) => Ok(HttpResponse::Ok().json(envelope)),
        Err(e) => Ok(error_response(&e)),
    }
}

#[derive(Debug, Deserialize)]
struct ImportCustomNodeBody {
    envelope: CustomNodeEnvelope,
    #[serde(default)]
    overwrite: bool,
}

#[post("/api/custom-nodes/import")]
async fn import_custom_node(
    data: web::Data<AppState>,
    body: web::Json<ImportCustomNodeBody>,
) -> ActixResult<impl Responder> {
    let body = body.into_inner();
    match data.service.import_custom_node(body.envelope, body.overwrite) {
        Ok(node) => Ok(HttpResponse::Created().json(node)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// WebSocket endpoint for live execution events
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    let mut events = data.events.subscribe();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(_) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting loom server");

    let database_path =
        std::env::var("LOOM_DATABASE").unwrap_or_else(|_| "loom.db".to_string());
    let database = Database::open(&database_path)?;
    info!("Database ready at {}", database_path);

    let events = Arc::new(EventBus::new(1000));

    let runner = match std::env::var("LOOM_RUNNER_URL") {
        Ok(url) if !url.is_empty() => {
            let timeout = std::env::var("LOOM_RUNNER_TIMEOUT_SECS")
                .ok()
                .and_then(|secs| secs.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RUNNER_TIMEOUT);
            info!("Execution runtime at {} (timeout {:?})", url, timeout);
            Some(Arc::new(HttpRunner::with_timeout(url, timeout)) as Arc<dyn loomruntime::RemoteRunner>)
        }
        _ => {
            info!("No execution runtime configured; runs will be simulated");
            None
        }
    };

    let orchestrator = Orchestrator::new(runner, Simulator::new(), events.clone());
    let service = Arc::new(LoomService::new(database, orchestrator));

    let app_state = web::Data::new(AppState { service, events });

    let bind_address =
        std::env::var("LOOM_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    info!("Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .service(health_check)
            .service(list_workflows)
            .service(save_workflow)
            .service(import_workflow)
            .service(get_workflow)
            .service(delete_workflow)
            .service(duplicate_workflow)
            .service(export_workflow)
            .service(execute_workflow)
            .service(get_execution_history)
            .service(get_node_templates)
            .service(save_node_template)
            .service(list_custom_nodes)
            .service(get_custom_node_by_name)
            .service(create_custom_node)
            .service(import_custom_node)
            .service(update_custom_node)
            .service(delete_custom_node)
            .service(export_custom_node)
            .service(websocket_events)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
