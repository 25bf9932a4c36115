//! Built-in Capability Set
//!
//! Demo tools, resources, and prompts served by the bundled binary: an
//! echo tool, small arithmetic tools, and a seeded in-memory user/task
//! directory exposed through tools, resources, and prompt templates.
//! Each capability declares both input and output schemas and registers
//! through the public registry API.


use crate::config::Config;
use crate::errors::DispatchResult;
use crate::protocol::{CapabilityKind, Payload};
use crate::registry::{CapabilityDescriptor, CapabilityHandler, CapabilityRegistry};
use crate::schema::{FieldType, Schema};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// A user in the demo directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
}

/// A task in the demo directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    pub status: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory user/task directory. Handler-owned state: the dispatcher
/// knows nothing about it, handlers share it behind an `Arc`.
pub struct DirectoryStore {
    users: RwLock<BTreeMap<String, User>>,
    tasks: RwLock<BTreeMap<String, TaskRecord>>,
    next_task_id: AtomicU64,
}

impl DirectoryStore {
    /// Create a store seeded with the demo users and tasks.
    #[inline]
    pub fn seeded() -> Self {
        let users = [
            ("1", "Alice Johnson", "alice@example.com", "admin"),
            ("2", "Bob Smith", "bob@example.com", "user"),
            ("3", "Carol Davis", "carol@example.com", "user"),
        ]
        .into_iter()
        .map(|(id, name, email, role)| {
            (
                id.to_string(),
                User {
                    id: id.to_string(),
                    name: name.to_string(),
                    email: email.to_string(),
                    role: role.to_string(),
                },
            )
        })
        .collect();

        let tasks = [
            ("1", "Set up dispatch server", "completed", "1"),
            ("2", "Wire transport adapter", "in_progress", "1"),
            ("3", "Test client connection", "pending", "2"),
        ]
        .into_iter()
        .map(|(id, title, status, user_id)| {
            (
                id.to_string(),
                TaskRecord {
                    id: id.to_string(),
                    title: title.to_string(),
                    status: status.to_string(),
                    user_id: user_id.to_string(),
                    created_at: Utc::now(),
                },
            )
        })
        .collect();

        Self {
            users: RwLock::new(users),
            tasks: RwLock::new(tasks),
            next_task_id: AtomicU64::new(4),
        }
    }

    #[inline]
    pub async fn get_user(&self, user_id: &str) -> Option<User> {
        self.users.read().await.get(user_id).cloned()
    }

    #[inline]
    pub async fn list_users(&self) -> Vec<User> {
        self.users.read().await.values().cloned().collect()
    }

    /// Tasks, optionally restricted to one user.
    #[inline]
    pub async fn list_tasks(&self, user_id: Option<&str>) -> Vec<TaskRecord> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|task| user_id.is_none_or(|id| task.user_id == id))
            .cloned()
            .collect()
    }

    /// Create a task for an existing user. Fails if the user is unknown.
    #[inline]
    pub async fn create_task(
        &self,
        title: String,
        user_id: String,
        status: String,
    ) -> Result<TaskRecord> {
        if self.get_user(&user_id).await.is_none() {
            return Err(anyhow!("User with ID {} not found", user_id));
        }

        let id = self.next_task_id.fetch_add(1, Ordering::SeqCst).to_string();
        let task = TaskRecord {
            id: id.clone(),
            title,
            status,
            user_id,
            created_at: Utc::now(),
        };
        self.tasks.write().await.insert(id, task.clone());
        Ok(task)
    }
}

fn str_arg<'a>(payload: &'a Payload, name: &str) -> Result<&'a str> {
    payload
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Missing required parameter: {}", name))
}

fn int_arg(payload: &Payload, name: &str) -> Result<i64> {
    let value = payload
        .get(name)
        .ok_or_else(|| anyhow!("Missing required parameter: {}", name))?;

    // The validator admits integral floats for integer fields; accept the
    // same values here.
    value
        .as_i64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        })
        .ok_or_else(|| anyhow!("Parameter {} is not an integer", name))
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Echo a message back, optionally stamped with the current time.
pub struct EchoHandler {
    server_name: String,
}

impl EchoHandler {
    #[inline]
    pub fn new(server_name: String) -> Self {
        Self { server_name }
    }

    #[inline]
    pub fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "echo".to_string(),
            kind: CapabilityKind::Tool,
            description: Some("Echo a message with optional timestamp".to_string()),
            input_schema: Schema::builder()
                .required("message", FieldType::String)
                .optional("timestamp", FieldType::Boolean)
                .build(),
            output_schema: Schema::builder()
                .required("message", FieldType::String)
                .required("server", FieldType::String)
                .optional("timestamp", FieldType::String)
                .build(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for EchoHandler {
    async fn handle(&self, payload: Payload) -> Result<Value> {
        let message = str_arg(&payload, "message")?;
        let stamped = payload
            .get("timestamp")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let mut result = json!({
            "message": message,
            "server": self.server_name,
        });
        if stamped {
            result["timestamp"] = json!(Utc::now().to_rfc3339());
        }
        Ok(result)
    }
}

/// Add two integers.
pub struct AddNumbersHandler;

impl AddNumbersHandler {
    #[inline]
    pub fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "add_numbers".to_string(),
            kind: CapabilityKind::Tool,
            description: Some("Add two integers together".to_string()),
            input_schema: Schema::builder()
                .required("a", FieldType::Integer)
                .required("b", FieldType::Integer)
                .build(),
            output_schema: Schema::builder().required("sum", FieldType::Integer).build(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for AddNumbersHandler {
    async fn handle(&self, payload: Payload) -> Result<Value> {
        let a = int_arg(&payload, "a")?;
        let b = int_arg(&payload, "b")?;
        let sum = a
            .checked_add(b)
            .ok_or_else(|| anyhow!("Integer overflow adding {} and {}", a, b))?;
        Ok(json!({ "sum": sum }))
    }
}

/// Calculate the Fibonacci sequence up to n terms.
pub struct FibonacciHandler;

impl FibonacciHandler {
    /// Largest term count before the sequence overflows a signed 64-bit
    /// integer.
    pub const MAX_TERMS: i64 = 92;

    #[inline]
    pub fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "calculate_fibonacci".to_string(),
            kind: CapabilityKind::Tool,
            description: Some("Calculate Fibonacci sequence up to n terms".to_string()),
            input_schema: Schema::builder().required("n", FieldType::Integer).build(),
            output_schema: Schema::builder()
                .required("sequence", FieldType::Array)
                .required("count", FieldType::Integer)
                .optional("last_number", FieldType::Integer)
                .build(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for FibonacciHandler {
    async fn handle(&self, payload: Payload) -> Result<Value> {
        let n = int_arg(&payload, "n")?;
        if n > Self::MAX_TERMS {
            return Err(anyhow!(
                "n must be at most {} to avoid overflow, got {}",
                Self::MAX_TERMS,
                n
            ));
        }

        if n <= 0 {
            return Ok(json!({ "sequence": [], "count": 0 }));
        }
        if n == 1 {
            return Ok(json!({ "sequence": [0], "count": 1 }));
        }
        if n == 2 {
            return Ok(json!({ "sequence": [0, 1], "count": 2 }));
        }

        let mut sequence: Vec<i64> = vec![0, 1];
        for i in 2..n as usize {
            let next = sequence[i - 1] + sequence[i - 2];
            sequence.push(next);
        }

        Ok(json!({
            "sequence": sequence,
            "count": n,
            "last_number": sequence[sequence.len() - 1],
        }))
    }
}

/// Look up a user by id.
pub struct GetUserHandler {
    store: Arc<DirectoryStore>,
}

impl GetUserHandler {
    #[inline]
    pub fn new(store: Arc<DirectoryStore>) -> Self {
        Self { store }
    }

    #[inline]
    pub fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "get_user".to_string(),
            kind: CapabilityKind::Tool,
            description: Some("Get a user by their ID".to_string()),
            input_schema: Schema::builder()
                .required("user_id", FieldType::String)
                .build(),
            output_schema: Schema::builder()
                .required("id", FieldType::String)
                .required("name", FieldType::String)
                .required("email", FieldType::String)
                .required("role", FieldType::String)
                .build(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for GetUserHandler {
    async fn handle(&self, payload: Payload) -> Result<Value> {
        let user_id = str_arg(&payload, "user_id")?;
        let user = self
            .store
            .get_user(user_id)
            .await
            .ok_or_else(|| anyhow!("User with ID {} not found", user_id))?;
        Ok(serde_json::to_value(user)?)
    }
}

/// List all users in the directory.
pub struct ListUsersHandler {
    store: Arc<DirectoryStore>,
}

impl ListUsersHandler {
    #[inline]
    pub fn new(store: Arc<DirectoryStore>) -> Self {
        Self { store }
    }

    #[inline]
    pub fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "list_users".to_string(),
            kind: CapabilityKind::Tool,
            description: Some("List all users".to_string()),
            input_schema: Schema::empty(),
            output_schema: Schema::builder().required("users", FieldType::Array).build(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for ListUsersHandler {
    async fn handle(&self, _payload: Payload) -> Result<Value> {
        let users = self.store.list_users().await;
        debug!("Listing {} users", users.len());
        Ok(json!({ "users": users }))
    }
}

/// Create a task assigned to an existing user.
pub struct CreateTaskHandler {
    store: Arc<DirectoryStore>,
}

impl CreateTaskHandler {
    #[inline]
    pub fn new(store: Arc<DirectoryStore>) -> Self {
        Self { store }
    }

    #[inline]
    pub fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "create_task".to_string(),
            kind: CapabilityKind::Tool,
            description: Some("Create a new task for a user".to_string()),
            input_schema: Schema::builder()
                .required("title", FieldType::String)
                .required("user_id", FieldType::String)
                .optional("status", FieldType::String)
                .build(),
            output_schema: Schema::builder()
                .required("id", FieldType::String)
                .required("title", FieldType::String)
                .required("status", FieldType::String)
                .required("user_id", FieldType::String)
                .required("created_at", FieldType::String)
                .build(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for CreateTaskHandler {
    async fn handle(&self, payload: Payload) -> Result<Value> {
        let title = str_arg(&payload, "title")?.to_string();
        let user_id = str_arg(&payload, "user_id")?.to_string();
        let status = payload
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("pending")
            .to_string();

        let task = self.store.create_task(title, user_id, status).await?;
        Ok(serde_json::to_value(task)?)
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Full user list as a resource.
pub struct UsersResourceHandler {
    store: Arc<DirectoryStore>,
}

impl UsersResourceHandler {
    #[inline]
    pub fn new(store: Arc<DirectoryStore>) -> Self {
        Self { store }
    }

    #[inline]
    pub fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "users".to_string(),
            kind: CapabilityKind::Resource,
            description: Some("All users in the directory".to_string()),
            input_schema: Schema::empty(),
            output_schema: Schema::builder().required("users", FieldType::Array).build(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for UsersResourceHandler {
    async fn handle(&self, _payload: Payload) -> Result<Value> {
        Ok(json!({ "users": self.store.list_users().await }))
    }
}

/// Task list as a resource, optionally filtered by user.
pub struct TasksResourceHandler {
    store: Arc<DirectoryStore>,
}

impl TasksResourceHandler {
    #[inline]
    pub fn new(store: Arc<DirectoryStore>) -> Self {
        Self { store }
    }

    #[inline]
    pub fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "tasks".to_string(),
            kind: CapabilityKind::Resource,
            description: Some("Tasks, optionally filtered by user ID".to_string()),
            input_schema: Schema::builder()
                .optional("user_id", FieldType::String)
                .build(),
            output_schema: Schema::builder().required("tasks", FieldType::Array).build(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for TasksResourceHandler {
    async fn handle(&self, payload: Payload) -> Result<Value> {
        let user_id = payload.get("user_id").and_then(|v| v.as_str());
        Ok(json!({ "tasks": self.store.list_tasks(user_id).await }))
    }
}

/// Server identity and feature list as a resource.
pub struct ServerConfigHandler {
    name: String,
    version: String,
    instructions: Option<String>,
}

impl ServerConfigHandler {
    #[inline]
    pub fn new(config: &Config) -> Self {
        Self {
            name: config.server.name.clone(),
            version: config.server.version.clone(),
            instructions: config.server.instructions.clone(),
        }
    }

    #[inline]
    pub fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "server_config".to_string(),
            kind: CapabilityKind::Resource,
            description: Some("Server configuration and feature list".to_string()),
            input_schema: Schema::empty(),
            output_schema: Schema::builder()
                .required("server_name", FieldType::String)
                .required("version", FieldType::String)
                .required("transport", FieldType::String)
                .required("features", FieldType::Array)
                .optional("instructions", FieldType::String)
                .build(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for ServerConfigHandler {
    async fn handle(&self, _payload: Payload) -> Result<Value> {
        let mut result = json!({
            "server_name": self.name,
            "version": self.version,
            "transport": "stdio",
            "features": ["tools", "resources", "prompts", "structured_output"],
        });
        if let Some(instructions) = &self.instructions {
            result["instructions"] = json!(instructions);
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// Render a summary prompt for one user.
pub struct UserSummaryHandler {
    store: Arc<DirectoryStore>,
}

impl UserSummaryHandler {
    #[inline]
    pub fn new(store: Arc<DirectoryStore>) -> Self {
        Self { store }
    }

    #[inline]
    pub fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "user_summary".to_string(),
            kind: CapabilityKind::Prompt,
            description: Some("Prompt to summarize a user's profile".to_string()),
            input_schema: Schema::builder()
                .required("user_id", FieldType::String)
                .build(),
            output_schema: Schema::builder()
                .required("prompt", FieldType::String)
                .build(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for UserSummaryHandler {
    async fn handle(&self, payload: Payload) -> Result<Value> {
        let user_id = str_arg(&payload, "user_id")?;

        let prompt = match self.store.get_user(user_id).await {
            Some(user) => format!(
                "Please provide a summary of this user:\n\n\
                 Name: {}\nEmail: {}\nRole: {}\nID: {}\n\n\
                 Include their role responsibilities and contact information in your summary.",
                user.name, user.email, user.role, user.id
            ),
            None => format!("No user found with ID: {}", user_id),
        };

        Ok(json!({ "prompt": prompt }))
    }
}

/// Render a task-planning prompt for a user and project.
pub struct TaskPlanningHandler;

impl TaskPlanningHandler {
    #[inline]
    pub fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "task_planning".to_string(),
            kind: CapabilityKind::Prompt,
            description: Some("Prompt to plan tasks for a project".to_string()),
            input_schema: Schema::builder()
                .required("user_id", FieldType::String)
                .optional("project", FieldType::String)
                .build(),
            output_schema: Schema::builder()
                .required("prompt", FieldType::String)
                .build(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for TaskPlanningHandler {
    async fn handle(&self, payload: Payload) -> Result<Value> {
        let user_id = str_arg(&payload, "user_id")?;
        let project = payload
            .get("project")
            .and_then(|v| v.as_str())
            .unwrap_or("General");

        let prompt = format!(
            "Help plan tasks for project: {}\n\nAssigned to user ID: {}\n\n\
             Please suggest a list of tasks that would be appropriate for this project, \
             considering the user's role and current workload.",
            project, user_id
        );

        Ok(json!({ "prompt": prompt }))
    }
}

/// Register the full built-in capability set.
#[inline]
pub fn register_builtins(
    registry: &mut CapabilityRegistry,
    store: Arc<DirectoryStore>,
    config: &Config,
) -> DispatchResult<()> {
    registry.register(
        EchoHandler::descriptor(),
        EchoHandler::new(config.server.name.clone()),
    )?;
    registry.register(AddNumbersHandler::descriptor(), AddNumbersHandler)?;
    registry.register(FibonacciHandler::descriptor(), FibonacciHandler)?;
    registry.register(
        GetUserHandler::descriptor(),
        GetUserHandler::new(Arc::clone(&store)),
    )?;
    registry.register(
        ListUsersHandler::descriptor(),
        ListUsersHandler::new(Arc::clone(&store)),
    )?;
    registry.register(
        CreateTaskHandler::descriptor(),
        CreateTaskHandler::new(Arc::clone(&store)),
    )?;
    registry.register(
        UsersResourceHandler::descriptor(),
        UsersResourceHandler::new(Arc::clone(&store)),
    )?;
    registry.register(
        TasksResourceHandler::descriptor(),
        TasksResourceHandler::new(Arc::clone(&store)),
    )?;
    registry.register(
        ServerConfigHandler::descriptor(),
        ServerConfigHandler::new(config),
    )?;
    registry.register(
        UserSummaryHandler::descriptor(),
        UserSummaryHandler::new(Arc::clone(&store)),
    )?;
    registry.register(TaskPlanningHandler::descriptor(), TaskPlanningHandler)?;

    debug!("Registered {} built-in capabilities", registry.len());
    Ok(())
}
