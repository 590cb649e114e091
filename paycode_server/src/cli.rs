use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print. Merchant secrets live in the database, not the environment, but keep
    // the list closed anyway.
    const DISPLAY_ENVS: [&str; 9] = [
        "RUST_LOG",
        "PAYCODE_HOST",
        "PAYCODE_PORT",
        "PAYCODE_DATABASE_URL",
        "PAYCODE_BOOTSTRAP_ACCOUNT_ID",
        "PAYCODE_ORDER_TIMEOUT",
        "PAYCODE_RECLAIM_BATCH_LIMIT",
        "PAYCODE_SWEEP_INTERVAL",
        "PAYCODE_RECORD_UNMATCHED",
    ];

    println!("Current environment values:");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
