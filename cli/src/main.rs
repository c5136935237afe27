use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use zoans::services::client_groups::ClientGroupInput;
use zoans::services::task_masters::{GenerateTasks, GeneratedTasksQuery, TaskMasterFilter};
use zoans::services::tasks::TaskFilter;
use zoans::services::users::{NewUser, Role, UserUpdate};
use zoans::services::{Id, auth, client_groups, clients, companies, dashboard, invoices, task_masters, tasks, users};
use zoans::{
    ApiClient, ApiConfig, ApiError, ApiResponse, ConfigError, FileStorage, GuardOutcome, Navigator, RenderContext,
    RouteGuard, SessionStore, UploadFile,
};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("not logged in; run `zoans login <identifier>` first")]
    NotLoggedIn,
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    WriteOutput {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Parser, Debug)]
#[command(name = "zoans", about = "Zoans task management API CLI")]
struct Cli {
    /// Backend base URL; defaults to `NUXT_PUBLIC_API_BASE`, then `ZOANS_API_BASE`,
    /// then http://localhost:9000.
    #[arg(long)]
    base_url: Option<String>,

    /// File holding the persisted session token.
    #[arg(long, env = "ZOANS_STORAGE", default_value = ".zoans-storage.json")]
    storage: PathBuf,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and persist the access token.
    Login {
        identifier: String,
        #[arg(long, env = "ZOANS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the persisted access token.
    Logout,
    /// Report whether a session token is stored.
    Status,
    Clients(ClientsCommand),
    Groups(GroupsCommand),
    Tasks(TasksCommand),
    TaskMasters(TaskMastersCommand),
    Invoices(InvoicesCommand),
    Companies(CompaniesCommand),
    Users(UsersCommand),
    Dashboard {
        /// Ask the backend to recompute the summary.
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },
}

impl Command {
    /// Page this command stands in for; `None` for commands that need no session.
    fn route(&self) -> Option<&'static str> {
        match self {
            Self::Login { .. } | Self::Logout | Self::Status => None,
            Self::Clients(_) => Some("/clients"),
            Self::Groups(_) => Some("/client-groups"),
            Self::Tasks(_) => Some("/tasks"),
            Self::TaskMasters(_) => Some("/task-masters"),
            Self::Invoices(_) => Some("/invoices"),
            Self::Companies(_) => Some("/my-companies"),
            Self::Users(_) => Some("/users"),
            Self::Dashboard { .. } => Some("/dashboard"),
        }
    }
}

// =============================================================================
// RESOURCE COMMANDS
// =============================================================================

#[derive(Args, Debug)]
struct ClientsCommand {
    #[command(subcommand)]
    command: ClientsSubcommand,
}

#[derive(Subcommand, Debug)]
enum ClientsSubcommand {
    List,
    Get {
        id: Id,
    },
    Create {
        #[arg(long)]
        data: String,
    },
    Update {
        id: Id,
        #[arg(long)]
        data: String,
    },
    Delete {
        id: Id,
    },
    Ungrouped,
    AvailableForGroup {
        group_id: Id,
    },
    /// Import clients from a spreadsheet.
    Import {
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct GroupsCommand {
    #[command(subcommand)]
    command: GroupsSubcommand,
}

#[derive(Subcommand, Debug)]
enum GroupsSubcommand {
    List,
    Get {
        id: Id,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        code: String,
    },
    Update {
        id: Id,
        #[arg(long)]
        name: String,
        #[arg(long)]
        code: String,
    },
    Delete {
        id: Id,
    },
    Assign {
        group_id: Id,
        #[arg(value_delimiter = ',')]
        client_ids: Vec<Id>,
    },
    Remove {
        group_id: Id,
        #[arg(value_delimiter = ',')]
        client_ids: Vec<Id>,
    },
}

#[derive(Args, Debug)]
struct TasksCommand {
    #[command(subcommand)]
    command: TasksSubcommand,
}

#[derive(Subcommand, Debug)]
enum TasksSubcommand {
    List {
        #[arg(long)]
        client_id: Option<Id>,
        #[arg(long)]
        assigned_to: Option<Id>,
        #[arg(long)]
        category_id: Option<Id>,
        #[arg(long)]
        status: Option<String>,
    },
    Get {
        id: Id,
    },
    Create {
        #[arg(long)]
        data: String,
    },
    Update {
        id: Id,
        #[arg(long)]
        data: String,
    },
    Assign {
        task_id: Id,
        user_id: Id,
    },
    BulkAssign {
        #[arg(long)]
        user_id: Id,
        #[arg(value_delimiter = ',', required = true)]
        task_ids: Vec<Id>,
    },
    /// Fetch several tasks by id.
    Bulk {
        #[arg(value_delimiter = ',', required = true)]
        ids: Vec<Id>,
    },
    /// Tasks assigned to the logged-in user.
    Mine,
}

#[derive(Args, Debug)]
struct TaskMastersCommand {
    #[command(subcommand)]
    command: TaskMastersSubcommand,
}

#[derive(Subcommand, Debug)]
enum TaskMastersSubcommand {
    List {
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        category_id: Option<Id>,
        #[arg(long)]
        fy: Option<String>,
    },
    Get {
        id: Id,
    },
    Create {
        #[arg(long)]
        data: String,
    },
    Update {
        id: Id,
        #[arg(long)]
        data: String,
    },
    Disable {
        id: Id,
    },
    AssignClients {
        id: Id,
        #[arg(value_delimiter = ',', required = true)]
        client_ids: Vec<Id>,
    },
    UnassignClient {
        id: Id,
        client_id: Id,
    },
    Generate {
        id: Id,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        financial_year: Option<String>,
        #[arg(long)]
        assigned_to: Option<Id>,
    },
    Generated {
        id: Id,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        financial_year: Option<String>,
    },
}

#[derive(Args, Debug)]
struct InvoicesCommand {
    #[command(subcommand)]
    command: InvoicesSubcommand,
}

#[derive(Subcommand, Debug)]
enum InvoicesSubcommand {
    List,
    Get {
        id: Id,
    },
    Create {
        #[arg(long)]
        data: String,
    },
    AddItem {
        id: Id,
        #[arg(long)]
        data: String,
    },
    Recalculate {
        id: Id,
    },
    Send {
        id: Id,
        #[arg(long, default_value = "{}")]
        data: String,
    },
    Status {
        id: Id,
        status: String,
    },
    /// Download the invoice PDF.
    Pdf {
        id: Id,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct CompaniesCommand {
    #[command(subcommand)]
    command: CompaniesSubcommand,
}

#[derive(Subcommand, Debug)]
enum CompaniesSubcommand {
    List,
    Get {
        id: Id,
    },
    Create {
        #[arg(long)]
        data: String,
    },
    Update {
        id: Id,
        #[arg(long)]
        data: String,
    },
    Delete {
        id: Id,
    },
    Seal {
        id: Id,
        file: PathBuf,
    },
    Signature {
        id: Id,
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct UsersCommand {
    #[command(subcommand)]
    command: UsersSubcommand,
}

#[derive(Subcommand, Debug)]
enum UsersSubcommand {
    List,
    Get {
        id: Id,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "ZOANS_NEW_USER_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "EMPLOYEE")]
        role: Role,
    },
    Update {
        id: Id,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        role: Option<Role>,
        #[arg(long)]
        active: Option<bool>,
    },
    Delete {
        id: Id,
    },
}

// =============================================================================
// ENTRY
// =============================================================================

/// Stands in for the login page redirect when a session ends.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate_to(&self, path: &str) {
        tracing::debug!(path, "redirect requested");
        eprintln!("session ended; run `zoans login <identifier>` to sign in again");
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match cli.base_url.as_deref() {
        Some(url) => ApiConfig::new(url)?,
        None => ApiConfig::from_env()?,
    };
    let storage = Arc::new(FileStorage::new(&cli.storage));
    let session = Arc::new(SessionStore::new(storage, Arc::new(TerminalNavigator)));
    let api = ApiClient::new(&config, session.clone())?;
    let guard = RouteGuard::new(session);

    let result = run(&api, &guard, cli.command).await;
    if let Err(CliError::Api(err)) = &result {
        if err.is_unauthorized() {
            eprintln!("the backend rejected the stored token; run `zoans logout` and log in again");
        }
    }
    result
}

fn init_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(api: &ApiClient, guard: &RouteGuard, command: Command) -> Result<(), CliError> {
    if let Some(route) = command.route() {
        require_session(guard, route)?;
    }

    match command {
        Command::Login { identifier, password } => run_login(api, &identifier, &password).await,
        Command::Logout => {
            api.session().clear_session();
            Ok(())
        }
        Command::Status => {
            let status = if api.session().is_authenticated() { "logged in" } else { "logged out" };
            println!("{status} ({})", api.base_url());
            Ok(())
        }
        Command::Clients(cmd) => run_clients(api, cmd).await,
        Command::Groups(cmd) => run_groups(api, cmd).await,
        Command::Tasks(cmd) => run_tasks(api, cmd).await,
        Command::TaskMasters(cmd) => run_task_masters(api, cmd).await,
        Command::Invoices(cmd) => run_invoices(api, cmd).await,
        Command::Companies(cmd) => run_companies(api, cmd).await,
        Command::Users(cmd) => run_users(api, cmd).await,
        Command::Dashboard { refresh } => {
            let resp = if refresh {
                dashboard::refresh_dashboard_summary(api).await?
            } else {
                dashboard::get_dashboard_summary(api).await?
            };
            print_response(&resp)
        }
    }
}

fn require_session(guard: &RouteGuard, route: &str) -> Result<(), CliError> {
    match guard.check(route, RenderContext::Browser) {
        GuardOutcome::Allow => Ok(()),
        GuardOutcome::Redirect(_) => Err(CliError::NotLoggedIn),
    }
}

async fn run_login(api: &ApiClient, identifier: &str, password: &str) -> Result<(), CliError> {
    let login = auth::login(api, identifier, password).await?;
    api.session().set_auth(&login);
    print_json(&login.user)?;
    Ok(())
}

async fn run_clients(api: &ApiClient, cmd: ClientsCommand) -> Result<(), CliError> {
    let resp = match cmd.command {
        ClientsSubcommand::List => clients::get_clients(api).await?,
        ClientsSubcommand::Get { id } => clients::get_client(api, id).await?,
        ClientsSubcommand::Create { data } => clients::create_client(api, &parse_data(&data)?).await?,
        ClientsSubcommand::Update { id, data } => clients::update_client(api, id, &parse_data(&data)?).await?,
        ClientsSubcommand::Delete { id } => clients::delete_client(api, id).await?,
        ClientsSubcommand::Ungrouped => clients::get_ungrouped_clients(api).await?,
        ClientsSubcommand::AvailableForGroup { group_id } => {
            clients::get_available_clients_for_group(api, group_id).await?
        }
        ClientsSubcommand::Import { file } => {
            let file = UploadFile::from_path(&file).await?;
            clients::import_clients_excel(api, file).await?
        }
    };
    print_response(&resp)
}

async fn run_groups(api: &ApiClient, cmd: GroupsCommand) -> Result<(), CliError> {
    let resp = match cmd.command {
        GroupsSubcommand::List => client_groups::get_client_groups(api).await?,
        GroupsSubcommand::Get { id } => client_groups::get_client_group(api, id).await?,
        GroupsSubcommand::Create { name, code } => {
            client_groups::create_client_group(api, &ClientGroupInput { name, code }).await?
        }
        GroupsSubcommand::Update { id, name, code } => {
            client_groups::update_client_group(api, id, &ClientGroupInput { name, code }).await?
        }
        GroupsSubcommand::Delete { id } => client_groups::delete_client_group(api, id).await?,
        GroupsSubcommand::Assign { group_id, client_ids } => {
            client_groups::assign_clients(api, group_id, &client_ids).await?
        }
        GroupsSubcommand::Remove { group_id, client_ids } => {
            client_groups::remove_clients_from_group(api, group_id, &client_ids).await?
        }
    };
    print_response(&resp)
}

async fn run_tasks(api: &ApiClient, cmd: TasksCommand) -> Result<(), CliError> {
    let resp = match cmd.command {
        TasksSubcommand::List { client_id, assigned_to, category_id, status } => {
            let filter = TaskFilter { client_id, assigned_to_user_id: assigned_to, category_id, status };
            if filter == TaskFilter::default() {
                tasks::get_tasks(api, None).await?
            } else {
                tasks::get_tasks(api, Some(&filter)).await?
            }
        }
        TasksSubcommand::Get { id } => tasks::get_task(api, id).await?,
        TasksSubcommand::Create { data } => tasks::create_task(api, &parse_data(&data)?).await?,
        TasksSubcommand::Update { id, data } => tasks::update_task(api, id, &parse_data(&data)?).await?,
        TasksSubcommand::Assign { task_id, user_id } => tasks::assign_task(api, task_id, user_id).await?,
        TasksSubcommand::BulkAssign { user_id, task_ids } => tasks::bulk_assign_tasks(api, &task_ids, user_id).await?,
        TasksSubcommand::Bulk { ids } => tasks::get_tasks_by_ids(api, &ids).await?,
        TasksSubcommand::Mine => tasks::get_my_tasks(api).await?,
    };
    print_response(&resp)
}

async fn run_task_masters(api: &ApiClient, cmd: TaskMastersCommand) -> Result<(), CliError> {
    let resp = match cmd.command {
        TaskMastersSubcommand::List { active, category_id, fy } => {
            let filter = TaskMasterFilter { is_active: active, category_id, fy };
            if filter == TaskMasterFilter::default() {
                task_masters::get_task_masters(api, None).await?
            } else {
                task_masters::get_task_masters(api, Some(&filter)).await?
            }
        }
        TaskMastersSubcommand::Get { id } => task_masters::get_task_master(api, id).await?,
        TaskMastersSubcommand::Create { data } => task_masters::create_task_master(api, &parse_data(&data)?).await?,
        TaskMastersSubcommand::Update { id, data } => {
            task_masters::update_task_master(api, id, &parse_data(&data)?).await?
        }
        TaskMastersSubcommand::Disable { id } => task_masters::disable_task_master(api, id).await?,
        TaskMastersSubcommand::AssignClients { id, client_ids } => {
            task_masters::assign_task_master_clients(api, id, &client_ids).await?
        }
        TaskMastersSubcommand::UnassignClient { id, client_id } => {
            task_masters::unassign_task_master_client(api, id, client_id).await?
        }
        TaskMastersSubcommand::Generate { id, year, month, financial_year, assigned_to } => {
            let request = GenerateTasks { year, month, financial_year, assigned_to_user_id: assigned_to };
            task_masters::generate_tasks(api, id, &request).await?
        }
        TaskMastersSubcommand::Generated { id, year, month, financial_year } => {
            let query = GeneratedTasksQuery { year, month, financial_year };
            task_masters::get_generated_tasks_by_master(api, id, &query).await?
        }
    };
    print_response(&resp)
}

async fn run_invoices(api: &ApiClient, cmd: InvoicesCommand) -> Result<(), CliError> {
    let resp = match cmd.command {
        InvoicesSubcommand::List => invoices::get_invoices(api).await?,
        InvoicesSubcommand::Get { id } => invoices::get_invoice_by_id(api, id).await?,
        InvoicesSubcommand::Create { data } => {
            let created = invoices::create_invoice(api, &parse_data(&data)?).await?;
            return print_json(&created);
        }
        InvoicesSubcommand::AddItem { id, data } => invoices::add_invoice_item(api, id, &parse_data(&data)?).await?,
        InvoicesSubcommand::Recalculate { id } => invoices::recalculate_invoice(api, id).await?,
        InvoicesSubcommand::Send { id, data } => invoices::send_invoice(api, id, &parse_data(&data)?).await?,
        InvoicesSubcommand::Status { id, status } => invoices::update_invoice_status(api, id, &status).await?,
        InvoicesSubcommand::Pdf { id, out } => {
            let pdf = invoices::download_invoice_pdf(api, id).await?;
            let out = out.unwrap_or_else(|| PathBuf::from(format!("invoice-{id}.pdf")));
            tokio::fs::write(&out, &pdf.data)
                .await
                .map_err(|source| CliError::WriteOutput { path: out.display().to_string(), source })?;
            println!("{} ({} bytes)", out.display(), pdf.data.len());
            return Ok(());
        }
    };
    print_response(&resp)
}

async fn run_companies(api: &ApiClient, cmd: CompaniesCommand) -> Result<(), CliError> {
    let resp = match cmd.command {
        CompaniesSubcommand::List => companies::get_my_companies(api).await?,
        CompaniesSubcommand::Get { id } => companies::get_my_company(api, id).await?,
        CompaniesSubcommand::Create { data } => companies::create_my_company(api, &parse_data(&data)?).await?,
        CompaniesSubcommand::Update { id, data } => companies::update_my_company(api, id, &parse_data(&data)?).await?,
        CompaniesSubcommand::Delete { id } => companies::delete_my_company(api, id).await?,
        CompaniesSubcommand::Seal { id, file } => {
            companies::upload_company_seal(api, id, UploadFile::from_path(&file).await?).await?
        }
        CompaniesSubcommand::Signature { id, file } => {
            companies::upload_company_signature(api, id, UploadFile::from_path(&file).await?).await?
        }
    };
    print_response(&resp)
}

async fn run_users(api: &ApiClient, cmd: UsersCommand) -> Result<(), CliError> {
    let resp = match cmd.command {
        UsersSubcommand::List => users::get_users(api).await?,
        UsersSubcommand::Get { id } => users::get_user_by_id(api, id).await?,
        UsersSubcommand::Create { name, email, password, role } => {
            users::create_user(api, &NewUser { name, email, password, role }).await?
        }
        UsersSubcommand::Update { id, name, email, password, role, active } => {
            let update = UserUpdate { name, email, password, role, is_active: active };
            users::update_user(api, id, &update).await?
        }
        UsersSubcommand::Delete { id } => users::delete_user(api, id).await?,
    };
    print_response(&resp)
}

// =============================================================================
// OUTPUT
// =============================================================================

fn parse_data(raw: &str) -> Result<Value, CliError> {
    Ok(serde_json::from_str::<Value>(raw)?)
}

fn print_response(resp: &ApiResponse) -> Result<(), CliError> {
    print_json(&resp.data)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
