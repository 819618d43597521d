//! Mock GitHub REST API serving the endpoints the scan pipeline calls.

use actix_web::{App, HttpResponse, HttpServer, web};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

/// A pull request known to the mock.
#[derive(Clone)]
pub struct MockPull {
    pub head_ref: String,
    pub head_sha: String,
    /// `(filename, patch)`
    pub files: Vec<(String, String)>,
}

/// A repository known to the mock.
#[derive(Clone, Default)]
pub struct MockRepo {
    pub license: Option<String>,
    pub pulls: HashMap<u64, MockPull>,
}

#[derive(Debug, Clone)]
pub struct RecordedStatus {
    pub repository: String,
    pub sha: String,
    pub state: String,
    pub description: String,
    pub context: String,
}

#[derive(Debug, Clone)]
pub struct RecordedComment {
    pub id: u64,
    pub repository: String,
    pub issue: u64,
    pub body: String,
    /// Times the comment was edited after creation.
    pub edits: u32,
}

#[derive(Default)]
pub struct MockGitHubState {
    /// Keyed by `owner/name`. Unknown repositories answer 404.
    pub repos: HashMap<String, MockRepo>,
    pub statuses: Vec<RecordedStatus>,
    pub comments: Vec<RecordedComment>,
    next_comment_id: u64,
}

type SharedState = web::Data<Arc<Mutex<MockGitHubState>>>;

fn repo_key(owner: &str, name: &str) -> String {
    format!("{}/{}", owner, name)
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "message": "Not Found" }))
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<usize>,
}

async fn get_repository(state: SharedState, path: web::Path<(String, String)>) -> HttpResponse {
    let (owner, name) = path.into_inner();
    let state = state.lock().unwrap();
    match state.repos.get(&repo_key(&owner, &name)) {
        Some(_) => HttpResponse::Ok().json(json!({
            "full_name": repo_key(&owner, &name),
            "html_url": format!("https://github.com/{}/{}", owner, name),
        })),
        None => not_found(),
    }
}

async fn get_pull(state: SharedState, path: web::Path<(String, String, u64)>) -> HttpResponse {
    let (owner, name, number) = path.into_inner();
    let state = state.lock().unwrap();
    let Some(pull) = state
        .repos
        .get(&repo_key(&owner, &name))
        .and_then(|repo| repo.pulls.get(&number))
    else {
        return not_found();
    };
    let repo_url = format!("https://github.com/{}/{}", owner, name);
    HttpResponse::Ok().json(json!({
        "number": number,
        "html_url": format!("{}/pull/{}", repo_url, number),
        "url": format!("https://api.github.com/repos/{}/{}/pulls/{}", owner, name, number),
        "head": {
            "ref": pull.head_ref,
            "sha": pull.head_sha,
            "repo": { "html_url": repo_url, "fork": false }
        },
        "base": {
            "ref": "main",
            "sha": "base000",
            "repo": { "html_url": repo_url, "fork": false }
        }
    }))
}

async fn get_pull_files(
    state: SharedState,
    path: web::Path<(String, String, u64)>,
    query: web::Query<PageQuery>,
) -> HttpResponse {
    let (owner, name, number) = path.into_inner();
    let state = state.lock().unwrap();
    let Some(pull) = state
        .repos
        .get(&repo_key(&owner, &name))
        .and_then(|repo| repo.pulls.get(&number))
    else {
        return not_found();
    };
    // Everything fits on the first page.
    if query.page.unwrap_or(1) > 1 {
        return HttpResponse::Ok().json(Vec::<Value>::new());
    }
    let files: Vec<Value> = pull
        .files
        .iter()
        .map(|(filename, patch)| {
            json!({ "filename": filename, "status": "added", "patch": patch })
        })
        .collect();
    HttpResponse::Ok().json(files)
}

async fn get_license(state: SharedState, path: web::Path<(String, String)>) -> HttpResponse {
    let (owner, name) = path.into_inner();
    let state = state.lock().unwrap();
    match state
        .repos
        .get(&repo_key(&owner, &name))
        .and_then(|repo| repo.license.clone())
    {
        Some(spdx_id) => HttpResponse::Ok().json(json!({ "license": { "spdx_id": spdx_id } })),
        None => not_found(),
    }
}

async fn post_status(
    state: SharedState,
    path: web::Path<(String, String, String)>,
    body: web::Json<Value>,
) -> HttpResponse {
    let (owner, name, sha) = path.into_inner();
    let field = |key: &str| body[key].as_str().unwrap_or_default().to_string();
    let mut state = state.lock().unwrap();
    if !state.repos.contains_key(&repo_key(&owner, &name)) {
        return not_found();
    }
    state.statuses.push(RecordedStatus {
        repository: repo_key(&owner, &name),
        sha,
        state: field("state"),
        description: field("description"),
        context: field("context"),
    });
    HttpResponse::Created().json(json!({ "state": field("state") }))
}

async fn list_comments(
    state: SharedState,
    path: web::Path<(String, String, u64)>,
    query: web::Query<PageQuery>,
) -> HttpResponse {
    let (owner, name, issue) = path.into_inner();
    if query.page.unwrap_or(1) > 1 {
        return HttpResponse::Ok().json(Vec::<Value>::new());
    }
    let repository = repo_key(&owner, &name);
    let state = state.lock().unwrap();
    let comments: Vec<Value> = state
        .comments
        .iter()
        .filter(|c| c.repository == repository && c.issue == issue)
        .map(|c| json!({ "id": c.id, "body": c.body }))
        .collect();
    HttpResponse::Ok().json(comments)
}

async fn create_comment(
    state: SharedState,
    path: web::Path<(String, String, u64)>,
    body: web::Json<Value>,
) -> HttpResponse {
    let (owner, name, issue) = path.into_inner();
    let mut state = state.lock().unwrap();
    state.next_comment_id += 1;
    let id = state.next_comment_id;
    state.comments.push(RecordedComment {
        id,
        repository: repo_key(&owner, &name),
        issue,
        body: body["body"].as_str().unwrap_or_default().to_string(),
        edits: 0,
    });
    HttpResponse::Created().json(json!({ "id": id }))
}

async fn edit_comment(
    state: SharedState,
    path: web::Path<(String, String, u64)>,
    body: web::Json<Value>,
) -> HttpResponse {
    let (_, _, id) = path.into_inner();
    let mut state = state.lock().unwrap();
    match state.comments.iter_mut().find(|c| c.id == id) {
        Some(comment) => {
            comment.body = body["body"].as_str().unwrap_or_default().to_string();
            comment.edits += 1;
            HttpResponse::Ok().json(json!({ "id": id }))
        }
        None => not_found(),
    }
}

/// Mock GitHub API on an ephemeral port.
pub struct MockGitHub {
    pub api_url: String,
    pub state: Arc<Mutex<MockGitHubState>>,
}

impl MockGitHub {
    /// Start the mock. Each test gets its own instance.
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(MockGitHubState::default()));

        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
        let port = listener.local_addr().unwrap().port();
        let api_url = format!("http://127.0.0.1:{}", port);

        let state_data = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state_data.clone()))
                .route("/repos/{owner}/{repo}", web::get().to(get_repository))
                .route("/repos/{owner}/{repo}/license", web::get().to(get_license))
                .route("/repos/{owner}/{repo}/pulls/{number}", web::get().to(get_pull))
                .route(
                    "/repos/{owner}/{repo}/pulls/{number}/files",
                    web::get().to(get_pull_files),
                )
                .route(
                    "/repos/{owner}/{repo}/statuses/{sha}",
                    web::post().to(post_status),
                )
                .route(
                    "/repos/{owner}/{repo}/issues/comments/{id}",
                    web::patch().to(edit_comment),
                )
                .service(
                    web::resource("/repos/{owner}/{repo}/issues/{number}/comments")
                        .route(web::get().to(list_comments))
                        .route(web::post().to(create_comment)),
                )
        })
        .workers(1)
        .listen(listener)
        .expect("failed to listen")
        .disable_signals()
        .run();

        // Fire and forget; the server lives until the test runtime ends
        tokio::spawn(server);

        MockGitHub { api_url, state }
    }

    /// Register a pull request (creating the repository if needed).
    pub fn add_pull(&self, repository: &str, license: Option<&str>, number: u64, pull: MockPull) {
        let mut state = self.state.lock().unwrap();
        let repo = state.repos.entry(repository.to_string()).or_default();
        repo.license = license.map(str::to_string);
        repo.pulls.insert(number, pull);
    }

    pub fn statuses(&self) -> Vec<RecordedStatus> {
        self.state.lock().unwrap().statuses.clone()
    }

    pub fn comments(&self) -> Vec<RecordedComment> {
        self.state.lock().unwrap().comments.clone()
    }
}
