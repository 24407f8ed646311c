use crate::cli::{
    confirm, truncate, WorkspaceCleanArgs, WorkspaceCommands, WorkspaceCreateArgs, WorkspaceIdArgs,
    WorkspaceListArgs, WorkspaceRemoveArgs,
};
use anyhow::Result;
use chrono::Utc;
use pitlane_core::filters::timeago;
use pitlane_core::{WorkspaceInfo, Workspaces};

pub fn run(cmd: WorkspaceCommands, workspaces: &Workspaces) -> Result<()> {
    match cmd {
        WorkspaceCommands::Create(args) => create(args, workspaces),
        WorkspaceCommands::List(args) => list(args, workspaces),
        WorkspaceCommands::Info(args) => info(args, workspaces),
        WorkspaceCommands::Remove(args) => remove(args, workspaces),
        WorkspaceCommands::Clean(args) => clean(args, workspaces),
    }
}

fn create(args: WorkspaceCreateArgs, workspaces: &Workspaces) -> Result<()> {
    let info = workspaces.create(args.session_id.as_deref(), args.description.as_deref())?;
    println!("Created workspace {}", info.metadata.session_id);
    println!("  Path: {}", info.workspace_path.display());
    Ok(())
}

fn list(args: WorkspaceListArgs, workspaces: &Workspaces) -> Result<()> {
    let items = workspaces.list(args.all)?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    print_workspace_table(&items);
    Ok(())
}

fn info(args: WorkspaceIdArgs, workspaces: &Workspaces) -> Result<()> {
    let info = workspaces.info(&args.session_id)?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let now = Utc::now();
    let m = &info.metadata;
    println!("Session:       {}", m.session_id);
    println!("Path:          {}", info.workspace_path.display());
    println!("Created:       {} ({})", m.created_at.to_rfc3339(), timeago(m.created_at, now));
    println!("Last accessed: {} ({})", m.last_accessed.to_rfc3339(), timeago(m.last_accessed, now));
    if let Some(desc) = &m.description {
        println!("Description:   {}", desc);
    }
    print_file_list("Data files", &info.data_files);
    print_file_list("Charts", &info.chart_files);
    Ok(())
}

fn remove(args: WorkspaceRemoveArgs, workspaces: &Workspaces) -> Result<()> {
    if !workspaces.exists(&args.session_id) {
        anyhow::bail!("Workspace not found: {}", args.session_id);
    }
    if !args.yes && !confirm(&format!("Remove workspace {}?", args.session_id))? {
        println!("Aborted.");
        return Ok(());
    }

    workspaces.remove(&args.session_id)?;
    println!("Removed workspace {}", args.session_id);
    Ok(())
}

fn clean(args: WorkspaceCleanArgs, workspaces: &Workspaces) -> Result<()> {
    if args.older_than_days.is_none() && !args.all {
        anyhow::bail!("Specify --older-than-days <N> or --all");
    }

    if !args.yes {
        let prompt = match args.older_than_days {
            Some(days) => format!("Remove workspaces idle for more than {} days?", days),
            None => "Remove ALL workspaces?".to_string(),
        };
        if !confirm(&prompt)? {
            println!("Aborted.");
            return Ok(());
        }
    }

    let report = workspaces.clean(args.older_than_days, args.all)?;
    println!("Removed {} workspace(s)", report.removed_count);
    for id in &report.removed_sessions {
        println!("  - {}", id);
    }
    Ok(())
}

fn print_workspace_table(items: &[WorkspaceInfo]) {
    if items.is_empty() {
        println!("(no workspaces)");
        return;
    }
    let now = Utc::now();
    println!(
        "{:<36}  {:<16}  {:>5}  {:>6}  {}",
        "SESSION", "LAST ACCESSED", "DATA", "CHARTS", "DESCRIPTION"
    );
    println!("{}", "─".repeat(90));
    for w in items {
        println!(
            "{:<36}  {:<16}  {:>5}  {:>6}  {}",
            w.metadata.session_id,
            timeago(w.metadata.last_accessed, now),
            w.data_files.len(),
            w.chart_files.len(),
            truncate(w.metadata.description.as_deref().unwrap_or(""), 24)
        );
    }
}

fn print_file_list(label: &str, files: &[String]) {
    if files.is_empty() {
        println!("{}: (none)", label);
        return;
    }
    println!("{}:", label);
    for f in files {
        println!("  {}", f);
    }
}
