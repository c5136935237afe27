use super::*;
use clap::CommandFactory;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn parses_comma_separated_client_ids() {
    let cli = Cli::try_parse_from(["zoans", "groups", "assign", "5", "1,2,3"]).unwrap();
    match cli.command {
        Command::Groups(GroupsCommand { command: GroupsSubcommand::Assign { group_id, client_ids } }) => {
            assert_eq!(group_id, 5);
            assert_eq!(client_ids, vec![1, 2, 3]);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parses_user_role() {
    let cli = Cli::try_parse_from([
        "zoans", "users", "create", "--name", "Ravi", "--email", "ravi@zoans.test", "--password", "pw", "--role",
        "manager",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Command::Users(UsersCommand { command: UsersSubcommand::Create { role: Role::Manager, .. } })
    ));
}

#[test]
fn session_commands_have_no_route() {
    let login = Cli::try_parse_from(["zoans", "login", "asha", "--password", "pw"]).unwrap();
    assert_eq!(login.command.route(), None);
    let logout = Cli::try_parse_from(["zoans", "logout"]).unwrap();
    assert_eq!(logout.command.route(), None);
}

#[test]
fn resource_commands_are_guarded() {
    let cli = Cli::try_parse_from(["zoans", "invoices", "pdf", "7"]).unwrap();
    assert_eq!(cli.command.route(), Some("/invoices"));

    let guard = RouteGuard::new(Arc::new(SessionStore::in_memory()));
    assert!(matches!(require_session(&guard, "/invoices"), Err(CliError::NotLoggedIn)));
}

#[test]
fn parse_data_rejects_invalid_json() {
    assert!(matches!(parse_data("{not json"), Err(CliError::InvalidJson(_))));
    assert_eq!(parse_data(r#"{"name":"Acme"}"#).unwrap(), serde_json::json!({ "name": "Acme" }));
}

#[test]
fn base_url_flag_does_not_read_environment() {
    let cmd = Cli::command();
    let base_url = cmd.get_arguments().find(|a| a.get_id() == "base_url").unwrap();
    assert!(base_url.get_env().is_none());

    let cli = Cli::try_parse_from(["zoans", "status"]).unwrap();
    assert_eq!(cli.base_url, None);
}
