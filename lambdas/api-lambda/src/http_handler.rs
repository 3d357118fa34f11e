use base64::Engine;
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use stadion_shared::{
    error::{ResourceError, StoreError},
    plans::{upload_plan_file, PlanFile, UploadPlanRequest},
    policy::{access, can_edit, can_see, Actor},
    repository::{Resource, ResourceRepository},
    store::{plan_file_key, BlobStore, ResourceStore},
    types::{Area, CreateUserRequest, Point, UpdateUserRequest, UserSummary},
    users::UserDirectory,
    AppState,
};
use std::sync::Arc;

/// Header carrying the acting username when `TRUST_USER_HEADER` is set.
const USER_HEADER: &str = "X-User-Name";

/// JWT claims naming the user, in order of preference.
const USERNAME_CLAIMS: [&str; 3] = ["username", "cognito:username", "sub"];

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceView<'a, R> {
    #[serde(flatten)]
    resource: &'a R,
    can_toggle: bool,
    can_edit: bool,
}

#[derive(Serialize)]
struct PlanView {
    index: usize,
    width: u32,
    height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<PlanFile>,
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(body)?.into())
        .map_err(Box::new)?)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Result<Response<Body>, Error> {
    let message: String = message.into();
    json_response(status, &serde_json::json!({ "error": message }))
}

fn no_content() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}

fn method_not_allowed() -> Result<Response<Body>, Error> {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

fn not_found() -> Result<Response<Body>, Error> {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

fn store_failure(e: StoreError) -> Result<Response<Body>, Error> {
    tracing::error!("Store failure: {}", e);
    error_response(StatusCode::BAD_GATEWAY, "Storage unavailable")
}

fn resource_error(e: ResourceError) -> Result<Response<Body>, Error> {
    match e {
        ResourceError::Store(e) => store_failure(e),
        ResourceError::Validation(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        e @ ResourceError::Unauthorized { .. } => error_response(StatusCode::FORBIDDEN, e.to_string()),
        e @ ResourceError::NotFound(_) => error_response(StatusCode::NOT_FOUND, e.to_string()),
    }
}

/// Username from the API Gateway authorizer, falling back to the plain
/// header only when the deployment trusts it.
fn acting_username(event: &Request, trust_header: bool) -> Option<String> {
    let claimed = event
        .request_context_ref()
        .and_then(|ctx| ctx.authorizer())
        .and_then(|auth| auth.jwt.as_ref())
        .and_then(|jwt| USERNAME_CLAIMS.iter().find_map(|claim| jwt.claims.get(*claim)))
        .map(|s| s.to_string());
    if claimed.is_some() || !trust_header {
        return claimed;
    }
    event
        .headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, Response<Body>> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::error!("Failed to parse request body: {}", e);
        Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(
                serde_json::json!({ "error": format!("Invalid request body: {}", e) })
                    .to_string()
                    .into(),
            )
            .unwrap_or_default()
    })
}

/// Main Lambda handler - resolves the acting user and routes the request
pub(crate) async fn function_handler<S: ResourceStore, B: BlobStore>(
    event: Request,
    state: Arc<AppState<S, B>>,
) -> Result<Response<Body>, Error> {
    let method = event.method().clone();
    let path = event.uri().path().to_string();
    let body: &[u8] = event.body();
    tracing::info!("Stadion API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET,POST,PUT,PATCH,DELETE,OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type,Authorization,X-User-Name")
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    let mut users = match UserDirectory::load(Arc::clone(&state.store)).await {
        Ok(users) => users,
        Err(e) => return store_failure(e),
    };
    if let Some((username, password)) = &state.config.bootstrap_admin {
        if let Err(e) = users.ensure_admin(username, password).await {
            return store_failure(e);
        }
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.as_slice() == ["login"] {
        return match method {
            Method::POST => login(&users, body),
            _ => method_not_allowed(),
        };
    }

    let actor = acting_username(&event, state.config.trust_user_header)
        .and_then(|name| users.actor(&name));
    let Some(actor) = actor else {
        return error_response(StatusCode::UNAUTHORIZED, "Unknown or missing user");
    };

    let plans = state.config.plans.len();
    match segments.as_slice() {
        ["plans"] => match method {
            Method::GET => list_plans(state.as_ref()).await,
            _ => method_not_allowed(),
        },
        ["plans", index, "file"] => match method {
            Method::POST => upload_plan(state.as_ref(), &actor, index, body).await,
            _ => method_not_allowed(),
        },
        ["points", rest @ ..] => {
            let repo = ResourceRepository::<Point, S>::new(Arc::clone(&state.store), plans);
            resource_route(repo, &actor, &method, rest, body).await
        }
        ["areas", rest @ ..] => {
            let repo = ResourceRepository::<Area, S>::new(Arc::clone(&state.store), plans);
            resource_route(repo, &actor, &method, rest, body).await
        }
        ["users", rest @ ..] => user_route(&mut users, &actor, &method, rest, body).await,
        _ => not_found(),
    }
}

fn login<S: ResourceStore>(users: &UserDirectory<S>, body: &[u8]) -> Result<Response<Body>, Error> {
    let req: LoginRequest = match parse_body(body) {
        Ok(req) => req,
        Err(resp) => return Ok(resp),
    };

    match users.authenticate(&req.username, &req.password) {
        Some(actor) => {
            tracing::info!("Login successful for {}", actor.username);
            json_response(
                StatusCode::OK,
                &UserSummary {
                    username: actor.username,
                    role: actor.role,
                },
            )
        }
        None => error_response(StatusCode::UNAUTHORIZED, "Incorrect username or password"),
    }
}

async fn list_plans<S: ResourceStore, B: BlobStore>(
    state: &AppState<S, B>,
) -> Result<Response<Body>, Error> {
    let mut views = Vec::with_capacity(state.config.plans.len());
    for (index, plan) in state.config.plans.iter().enumerate() {
        let stored = match state.store.get_string(&plan_file_key(index)).await {
            Ok(stored) => stored,
            Err(e) => return store_failure(e),
        };
        let file = stored.and_then(|raw| match serde_json::from_str::<PlanFile>(&raw) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!("Ignoring malformed plan file record for plan {}: {}", index, e);
                None
            }
        });
        views.push(PlanView {
            index,
            width: plan.width,
            height: plan.height,
            file,
        });
    }
    json_response(StatusCode::OK, &views)
}

async fn upload_plan<S: ResourceStore, B: BlobStore>(
    state: &AppState<S, B>,
    actor: &Actor,
    index: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    if !can_edit(actor.role) {
        return error_response(StatusCode::FORBIDDEN, "not allowed to upload plans");
    }
    let Some(index) = index
        .parse::<usize>()
        .ok()
        .filter(|i| *i < state.config.plans.len())
    else {
        return not_found();
    };

    let req: UploadPlanRequest = match parse_body(body) {
        Ok(req) => req,
        Err(resp) => return Ok(resp),
    };
    let bytes = match base64::engine::general_purpose::STANDARD.decode(&req.file_data) {
        Ok(bytes) => bytes,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Failed to decode base64: {}", e),
            )
        }
    };

    let file = upload_plan_file(&state.blobs, bytes, &req.file_name, &req.content_type).await;
    let raw = serde_json::to_string(&file)?;
    if let Err(e) = state.store.set_string(&plan_file_key(index), &raw).await {
        return store_failure(e);
    }

    tracing::info!("{} replaced the file of plan {}", actor.username, index);
    json_response(StatusCode::CREATED, &file)
}

async fn resource_route<R: Resource, S: ResourceStore>(
    mut repo: ResourceRepository<R, S>,
    actor: &Actor,
    method: &Method,
    rest: &[&str],
    body: &[u8],
) -> Result<Response<Body>, Error> {
    if let Err(e) = repo.load().await {
        return store_failure(e);
    }

    match (method, rest) {
        (&Method::GET, []) => {
            let views: Vec<ResourceView<'_, R>> = repo
                .visible_to(actor)
                .map(|resource| {
                    let access = access(actor, resource);
                    ResourceView {
                        resource,
                        can_toggle: access.can_toggle,
                        can_edit: access.can_edit,
                    }
                })
                .collect();
            json_response(StatusCode::OK, &views)
        }
        (&Method::GET, [id]) => match repo.get(id).filter(|r| can_see(actor, *r)) {
            Some(resource) => json_response(StatusCode::OK, resource),
            None => not_found(),
        },
        (&Method::PUT, []) => {
            let resource: R = match parse_body(body) {
                Ok(resource) => resource,
                Err(resp) => return Ok(resp),
            };
            match repo.upsert(actor, resource.clone()).await {
                Ok(()) => json_response(StatusCode::OK, &resource),
                Err(e) => resource_error(e),
            }
        }
        (&Method::PATCH, [id]) => {
            let update: R::Update = match parse_body(body) {
                Ok(update) => update,
                Err(resp) => return Ok(resp),
            };
            match repo.update(actor, id, update).await {
                Ok(updated) => json_response(StatusCode::OK, &updated),
                Err(e) => resource_error(e),
            }
        }
        (&Method::DELETE, [id]) => match repo.remove(actor, id).await {
            Ok(_) => no_content(),
            Err(e) => resource_error(e),
        },
        (&Method::POST, [id, "toggle"]) => match repo.toggle_ready(actor, id).await {
            Ok(toggled) => json_response(StatusCode::OK, &toggled),
            Err(e) => resource_error(e),
        },
        (_, [] | [_] | [_, "toggle"]) => method_not_allowed(),
        _ => not_found(),
    }
}

async fn user_route<S: ResourceStore>(
    users: &mut UserDirectory<S>,
    actor: &Actor,
    method: &Method,
    rest: &[&str],
    body: &[u8],
) -> Result<Response<Body>, Error> {
    match (method, rest) {
        (&Method::GET, []) => {
            // editors need the list to assign users
            if !can_edit(actor.role) {
                return error_response(StatusCode::FORBIDDEN, "not allowed to list users");
            }
            let summaries: Vec<UserSummary> = users.users().iter().map(|u| u.summary()).collect();
            json_response(StatusCode::OK, &summaries)
        }
        (&Method::POST, []) => {
            let req: CreateUserRequest = match parse_body(body) {
                Ok(req) => req,
                Err(resp) => return Ok(resp),
            };
            match users.create_user(actor, req).await {
                Ok(user) => json_response(StatusCode::CREATED, &user.summary()),
                Err(e) => resource_error(e),
            }
        }
        (&Method::PATCH, [username]) => {
            let req: UpdateUserRequest = match parse_body(body) {
                Ok(req) => req,
                Err(resp) => return Ok(resp),
            };
            match users.update_user(actor, username, req).await {
                Ok(user) => json_response(StatusCode::OK, &user.summary()),
                Err(e) => resource_error(e),
            }
        }
        (&Method::DELETE, [username]) => match users.delete_user(actor, username).await {
            Ok(_) => no_content(),
            Err(e) => resource_error(e),
        },
        (_, [] | [_]) => method_not_allowed(),
        _ => not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use stadion_shared::config::Config;
    use lambda_http::aws_lambda_events::apigw::{
        ApiGatewayProxyRequestContext, ApiGatewayRequestAuthorizerJwtDescription,
    };
    use lambda_http::request::RequestContext;
    use stadion_shared::store::{MemoryBlobStore, MemoryStore};

    type TestState = Arc<AppState<MemoryStore, MemoryBlobStore>>;

    fn state_with(trust_user_header: bool) -> TestState {
        let config = Config::from_lookup(|var| match var {
            "PLAN_SIZES" => Some("1000x800,1200x600".to_string()),
            "ADMIN_USERNAME" => Some("admin".to_string()),
            "ADMIN_PASSWORD" => Some("start123".to_string()),
            "TRUST_USER_HEADER" if trust_user_header => Some("true".to_string()),
            _ => None,
        })
        .unwrap();
        AppState::new(MemoryStore::new(), MemoryBlobStore::new(), config)
    }

    fn state() -> TestState {
        state_with(true)
    }

    fn with_claims(mut request: Request, claims: &[(&str, &str)]) -> Request {
        let mut jwt = ApiGatewayRequestAuthorizerJwtDescription::default();
        jwt.claims = claims
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut context = ApiGatewayProxyRequestContext::default();
        context.authorizer.jwt = Some(jwt);
        request
            .extensions_mut()
            .insert(RequestContext::ApiGatewayV1(context));
        request
    }

    fn request(method: &str, path: &str, user: Option<&str>, body: Option<Value>) -> Request {
        let mut builder = lambda_http::http::Request::builder().method(method).uri(path);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or(Body::Empty);
        builder.body(body).unwrap()
    }

    async fn call(
        state: &TestState,
        method: &str,
        path: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = function_handler(request(method, path, user, body), Arc::clone(state))
            .await
            .unwrap();
        let status = response.status();
        let value = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
        (status, value)
    }

    fn point_json(id: &str, assigned: &[&str]) -> Value {
        json!({
            "id": id,
            "name": format!("Tor {}", id),
            "type": "gate",
            "positions": [[{"dx": 0.1, "dy": 0.2}, {"dx": 0.3, "dy": 0.4}]],
            "isReady": false,
            "assignedUsers": assigned
        })
    }

    async fn create_ordner(state: &TestState, name: &str) {
        let (status, _) = call(
            state,
            "POST",
            "/users",
            Some("admin"),
            Some(json!({"username": name, "password": "pw", "role": "ordner"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_login() {
        let state = state();
        let (status, body) = call(
            &state,
            "POST",
            "/login",
            None,
            Some(json!({"username": "admin", "password": "start123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"username": "admin", "role": "admin"}));

        let (status, _) = call(
            &state,
            "POST",
            "/login",
            None,
            Some(json!({"username": "admin", "password": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&state, "GET", "/login", None, None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_unknown_user_is_unauthorized() {
        let state = state();
        let (status, _) = call(&state, "GET", "/points", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&state, "GET", "/points", Some("ghost"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_user_header_needs_trust() {
        let state = state_with(false);
        let (status, _) = call(&state, "GET", "/users", Some("admin"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let event = with_claims(request("GET", "/users", None, None), &[("username", "admin")]);
        let response = function_handler(event, Arc::clone(&state)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // the claim wins over a trusted header
        let trusted = state_with(true);
        let event = with_claims(request("GET", "/users", Some("admin"), None), &[("sub", "ghost")]);
        let response = function_handler(event, Arc::clone(&trusted)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_ordner_sees_and_toggles_only_assigned_points() {
        let state = state();
        create_ordner(&state, "ole").await;

        for point in [point_json("p1", &["ole"]), point_json("p2", &[])] {
            let (status, _) = call(&state, "PUT", "/points", Some("admin"), Some(point)).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = call(&state, "GET", "/points", Some("ole"), None).await;
        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], "p1");
        assert_eq!(list[0]["canToggle"], true);
        assert_eq!(list[0]["canEdit"], false);

        let (status, body) = call(&state, "POST", "/points/p1/toggle", Some("ole"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isReady"], true);

        let (status, _) = call(&state, "POST", "/points/p2/toggle", Some("ole"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&state, "GET", "/points/p2", Some("ole"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&state, "PUT", "/points", Some("ole"), Some(point_json("p3", &[]))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_point_patch_and_delete() {
        let state = state();
        call(&state, "PUT", "/points", Some("admin"), Some(point_json("p1", &[]))).await;

        let (status, body) = call(
            &state,
            "PATCH",
            "/points/p1",
            Some("admin"),
            Some(json!({"name": "Haupteingang", "type": "entryPedestrian"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Haupteingang");
        assert_eq!(body["type"], "entryPedestrian");
        assert_eq!(body["positions"][0][1], json!({"dx": 0.3, "dy": 0.4}));

        let (status, _) = call(&state, "DELETE", "/points/p1", Some("admin"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&state, "GET", "/points/p1", Some("admin"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&state, "DELETE", "/points/p1", Some("admin"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_incomplete_area_is_rejected() {
        let state = state();
        let area = json!({
            "id": "a1",
            "name": "Block A",
            "positions": [[{"dx": 0.1, "dy": 0.1}, {"dx": 0.5, "dy": 0.1}, {"dx": 0.3, "dy": 0.4}], []],
            "color": 4294901760u32,
            "assignedUsers": [],
            "isReady": false
        });
        let (status, body) = call(&state, "PUT", "/areas", Some("admin"), Some(area)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("plan 1"));

        let (_, body) = call(&state, "GET", "/areas", Some("admin"), None).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_plan_upload() {
        let state = state();
        let data = base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.7");
        let upload = json!({
            "file_name": "unterrang.pdf",
            "content_type": "application/pdf",
            "file_data": data
        });

        let (status, body) = call(&state, "POST", "/plans/1/file", Some("admin"), Some(upload.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let locator = body["locator"].as_str().unwrap().to_string();
        assert_eq!(state.blobs.read(&locator).await, Some(b"%PDF-1.7".to_vec()));

        let (status, body) = call(&state, "GET", "/plans", Some("admin"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["width"], 1000);
        assert!(body[0].get("file").is_none());
        assert_eq!(body[1]["file"]["locator"], locator.as_str());

        let (status, _) = call(&state, "POST", "/plans/2/file", Some("admin"), Some(upload.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        create_ordner(&state, "ole").await;
        let (status, _) = call(&state, "POST", "/plans/0/file", Some("ole"), Some(upload)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_user_administration() {
        let state = state();
        create_ordner(&state, "ole").await;

        let (status, _) = call(
            &state,
            "POST",
            "/users",
            Some("admin"),
            Some(json!({"username": "ole", "password": "x", "role": "ordner"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&state, "GET", "/users", Some("admin"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{"username": "admin", "role": "admin"}, {"username": "ole", "role": "ordner"}])
        );

        let (status, _) = call(&state, "GET", "/users", Some("ole"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &state,
            "PATCH",
            "/users/ole",
            Some("admin"),
            Some(json!({"role": "bereichsleiter"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "bereichsleiter");

        let (status, _) = call(&state, "DELETE", "/users/ole", Some("admin"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&state, "GET", "/points", Some("ole"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_routing_errors() {
        let state = state();
        let (status, _) = call(&state, "GET", "/stadiums", Some("admin"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&state, "PUT", "/points/p1/toggle", Some("admin"), None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        let (status, _) = call(&state, "PUT", "/points", Some("admin"), Some(json!("nope"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
