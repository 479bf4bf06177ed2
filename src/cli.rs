use crate::{
    bannerlord::{self, GamePaths},
    config::{self, AppConfig},
    order::{ModOrder, OrderError},
    scan,
};
use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

struct GlobalOptions {
    format: OutputFormat,
    force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    ModsList(ModsListOptions),
    DepsList,
    DepsMissing,
    SortTopo,
    SortAlpha,
    SortReverse,
    Move { id: String, target: MoveTarget },
    Enable(ToggleTarget),
    Disable(ToggleTarget),
    Invert,
    Validate,
    Paths,
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ModsListOptions {
    sort: ModSortKey,
    reverse: bool,
    filter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModSortKey {
    Order,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveTarget {
    Up,
    Down,
    Top,
    Bottom,
    To(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ToggleTarget {
    All,
    One(String),
}

struct Session {
    config: AppConfig,
    paths: GamePaths,
    data_dir: PathBuf,
    order: ModOrder,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    run_with_args(&args)
}

fn run_with_args(args: &[String]) -> Result<()> {
    let (global, command) = parse_args(args);
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("BannerSmith v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let mut session = open_session()?;
            run_command(&mut session, command, &global)
        }
    }
}

fn open_session() -> Result<Session> {
    let config = AppConfig::load_or_create()?;
    let override_root = config.game_root.as_deref().filter(|path| path.is_dir());
    let paths = bannerlord::detect_paths(override_root)?;

    let scanned = scan::scan_modules(&paths.modules_dir)?;
    for warning in &scanned.warnings {
        eprintln!("Warning: {warning}");
    }

    let mut order = ModOrder::load(scanned.entries)?;
    let data_dir = config::base_data_dir()?;
    if let Some(snapshot) = config::load_saved_order(&data_dir)? {
        order.apply_snapshot(&snapshot);
    }

    Ok(Session {
        config,
        paths,
        data_dir,
        order,
    })
}

fn persist(session: &Session, force: bool) -> Result<()> {
    if session.order.has_conflicts() && session.config.confirm_conflict_save && !force {
        bail!("mod list still has conflicts; rerun with --force to save anyway");
    }
    config::save_order(&session.data_dir, &session.order.snapshot())
}

fn parse_args(args: &[String]) -> (GlobalOptions, CliCommand) {
    let (global, tokens) = parse_global_options(args);

    if tokens.is_empty() {
        return (global, CliCommand::ModsList(default_mods_list()));
    }
    if matches!(tokens[0].as_str(), "--help" | "-h" | "help") {
        return (global, CliCommand::Help);
    }
    if matches!(tokens[0].as_str(), "--version" | "-V" | "version") {
        return (global, CliCommand::Version);
    }

    let command = parse_subcommand(&tokens).unwrap_or(CliCommand::Help);
    (global, command)
}

fn parse_global_options(args: &[String]) -> (GlobalOptions, Vec<String>) {
    let mut format = OutputFormat::Text;
    let mut force = false;
    let mut tokens = Vec::new();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            if let Some(parsed) = OutputFormat::parse(value) {
                format = parsed;
            }
            continue;
        }
        if arg == "--format" {
            if let Some(value) = iter.next() {
                if let Some(parsed) = OutputFormat::parse(value) {
                    format = parsed;
                }
            }
            continue;
        }
        if arg == "--force" {
            force = true;
            continue;
        }
        tokens.push(arg.to_string());
    }

    (GlobalOptions { format, force }, tokens)
}

fn default_mods_list() -> ModsListOptions {
    ModsListOptions {
        sort: ModSortKey::Order,
        reverse: false,
        filter: None,
    }
}

fn parse_subcommand(tokens: &[String]) -> Option<CliCommand> {
    let head = tokens.first()?;
    let rest = tokens.get(1..).unwrap_or(&[]);
    match head.as_str() {
        "mods" => Some(CliCommand::ModsList(parse_mods_list(rest))),
        "deps" => match rest.first().map(|value| value.as_str()).unwrap_or("missing") {
            "list" => Some(CliCommand::DepsList),
            "missing" => Some(CliCommand::DepsMissing),
            _ => None,
        },
        "sort" => match rest.first().map(|value| value.as_str()) {
            Some("topo") | None => Some(CliCommand::SortTopo),
            Some("alpha") => Some(CliCommand::SortAlpha),
            Some("reverse") => Some(CliCommand::SortReverse),
            _ => None,
        },
        "move" => parse_move(rest),
        "enable" => parse_toggle(rest).map(CliCommand::Enable),
        "disable" => parse_toggle(rest).map(CliCommand::Disable),
        "invert" => Some(CliCommand::Invert),
        "validate" => Some(CliCommand::Validate),
        "paths" => Some(CliCommand::Paths),
        _ => None,
    }
}

fn parse_mods_list(tokens: &[String]) -> ModsListOptions {
    let mut options = default_mods_list();
    let mut iter = tokens.iter().peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--sort" => {
                if let Some(value) = iter.next() {
                    match value.as_str() {
                        "order" => options.sort = ModSortKey::Order,
                        "name" => options.sort = ModSortKey::Name,
                        _ => {}
                    }
                }
            }
            "--reverse" => options.reverse = true,
            "--filter" => {
                if let Some(value) = iter.next() {
                    options.filter = Some(value.to_string());
                }
            }
            _ => {}
        }
    }
    options
}

fn parse_move(tokens: &[String]) -> Option<CliCommand> {
    let id = tokens.first()?.to_string();
    let mut iter = tokens.iter().skip(1);
    let target = loop {
        match iter.next().map(|value| value.as_str()) {
            Some("--up") => break MoveTarget::Up,
            Some("--down") => break MoveTarget::Down,
            Some("--top") => break MoveTarget::Top,
            Some("--bottom") => break MoveTarget::Bottom,
            Some("--to") => {
                let index = iter.next()?.parse::<usize>().ok()?;
                break MoveTarget::To(index);
            }
            Some(_) => continue,
            None => return None,
        }
    };
    Some(CliCommand::Move { id, target })
}

fn parse_toggle(tokens: &[String]) -> Option<ToggleTarget> {
    match tokens.first().map(|value| value.as_str()) {
        Some("--all") => Some(ToggleTarget::All),
        Some(id) => Some(ToggleTarget::One(id.to_string())),
        None => None,
    }
}

fn run_command(session: &mut Session, command: CliCommand, global: &GlobalOptions) -> Result<()> {
    match command {
        CliCommand::ModsList(options) => list_mods(session, &options, global.format),
        CliCommand::DepsList => list_dependencies(session, global.format),
        CliCommand::DepsMissing => list_missing_dependencies(session, global.format),
        CliCommand::SortTopo => {
            match session.order.topological_sort() {
                Ok(report) => {
                    println!("Reordered {} of {} mods", report.moved, report.total);
                }
                Err(OrderError::CyclicDependency { members }) => {
                    bail!("dependency cycle among: {}", members.join(" -> "));
                }
                Err(err) => return Err(err.into()),
            }
            persist(session, global.force)
        }
        CliCommand::SortAlpha => {
            session.order.alpha_sort();
            persist(session, global.force)
        }
        CliCommand::SortReverse => {
            session.order.reverse_order();
            persist(session, global.force)
        }
        CliCommand::Move { id, target } => {
            apply_move(session, &id, target)?;
            persist(session, global.force)
        }
        CliCommand::Enable(target) => {
            apply_toggle(session, &target, true)?;
            persist(session, global.force)
        }
        CliCommand::Disable(target) => {
            apply_toggle(session, &target, false)?;
            persist(session, global.force)
        }
        CliCommand::Invert => {
            session.order.invert_check();
            persist(session, global.force)
        }
        CliCommand::Validate => report_conflicts(session, global.format),
        CliCommand::Paths => list_paths(session, global.format),
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

fn apply_move(session: &mut Session, id: &str, target: MoveTarget) -> Result<()> {
    let Some(index) = session.order.position(id) else {
        bail!("unknown module id: {id}");
    };
    match target {
        MoveTarget::Up => session.order.move_up(index)?,
        MoveTarget::Down => session.order.move_down(index)?,
        MoveTarget::Top => session.order.move_to_top(index)?,
        MoveTarget::Bottom => session.order.move_to_bottom(index)?,
        MoveTarget::To(position) => {
            // same remove/insert pair an external reorder would use;
            // positions are 1-based, matching the `mods` listing
            let Some(entry) = session.order.remove_by_id(id) else {
                bail!("unknown module id: {id}");
            };
            let clamped = position.saturating_sub(1).min(session.order.len());
            session.order.insert(clamped, entry)?;
        }
    }
    Ok(())
}

fn apply_toggle(session: &mut Session, target: &ToggleTarget, enabled: bool) -> Result<()> {
    match target {
        ToggleTarget::All => {
            if enabled {
                session.order.check_all();
            } else {
                session.order.uncheck_all();
            }
        }
        ToggleTarget::One(id) => {
            if !session.order.set_enabled(id, enabled) {
                bail!("unknown module id: {id}");
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ModListItem {
    order: usize,
    id: String,
    name: String,
    version: String,
    enabled: bool,
    official: bool,
    has_conflicts: bool,
}

fn list_mods(session: &Session, options: &ModsListOptions, format: OutputFormat) -> Result<()> {
    if session.order.is_empty() {
        println!("No modules found in {}", session.paths.modules_dir.display());
        return Ok(());
    }

    let mut items: Vec<ModListItem> = session
        .order
        .entries()
        .iter()
        .enumerate()
        .map(|(index, entry)| ModListItem {
            order: index + 1,
            id: entry.id.clone(),
            name: entry.display_name().to_string(),
            version: entry.version.clone(),
            enabled: entry.enabled,
            official: entry.official,
            has_conflicts: entry.has_conflicts,
        })
        .collect();

    if let Some(filter) = &options.filter {
        let needle = filter.to_ascii_lowercase();
        items.retain(|item| {
            item.name.to_ascii_lowercase().contains(&needle)
                || item.id.to_ascii_lowercase().contains(&needle)
        });
    }

    match options.sort {
        ModSortKey::Order => {}
        ModSortKey::Name => items.sort_by(|a, b| {
            a.name
                .to_ascii_lowercase()
                .cmp(&b.name.to_ascii_lowercase())
        }),
    }

    if options.reverse {
        items.reverse();
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            for item in items {
                let enabled = if item.enabled { "x" } else { " " };
                let conflict = if item.has_conflicts { "!" } else { " " };
                let official = if item.official { " official" } else { "" };
                println!(
                    "{order:>3} [{enabled}]{conflict} {version:<12} {name} ({id}){official}",
                    order = item.order,
                    version = item.version,
                    name = item.name,
                    id = item.id,
                );
            }
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct DependencyListItem {
    mod_name: String,
    mod_id: String,
    dependencies: Vec<DependencyRef>,
}

#[derive(Serialize)]
struct DependencyRef {
    id: String,
    name: Option<String>,
    enabled: bool,
}

fn list_dependencies(session: &Session, format: OutputFormat) -> Result<()> {
    let position: HashMap<&str, usize> = session
        .order
        .entries()
        .iter()
        .enumerate()
        .map(|(index, entry)| (entry.id.as_str(), index))
        .collect();

    let mut list = Vec::new();
    for entry in session.order.entries() {
        if entry.dependencies.is_empty() {
            continue;
        }
        let mut refs = Vec::new();
        for dep_id in &entry.dependencies {
            let dep = position
                .get(dep_id.as_str())
                .and_then(|&index| session.order.get(index));
            refs.push(DependencyRef {
                id: dep_id.clone(),
                name: dep.map(|dep| dep.display_name().to_string()),
                enabled: dep.map(|dep| dep.enabled).unwrap_or(false),
            });
        }
        list.push(DependencyListItem {
            mod_name: entry.display_name().to_string(),
            mod_id: entry.id.clone(),
            dependencies: refs,
        });
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        OutputFormat::Text => {
            if list.is_empty() {
                println!("No dependencies declared.");
            } else {
                for item in list {
                    println!("{} ({})", item.mod_name, item.mod_id);
                    for dep in item.dependencies {
                        let name = dep.name.unwrap_or_else(|| "Unknown".to_string());
                        let status = if dep.enabled { "enabled" } else { "disabled" };
                        println!("  -> {} ({}) {}", dep.id, name, status);
                    }
                }
            }
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct MissingDependencyItem {
    required_by: String,
    required_by_id: String,
    dependency_id: String,
    reason: String,
}

fn list_missing_dependencies(session: &Session, format: OutputFormat) -> Result<()> {
    let position: HashMap<&str, usize> = session
        .order
        .entries()
        .iter()
        .enumerate()
        .map(|(index, entry)| (entry.id.as_str(), index))
        .collect();

    let mut missing = Vec::new();
    for (index, entry) in session.order.entries().iter().enumerate() {
        if !entry.enabled {
            continue;
        }
        for dep_id in &entry.dependencies {
            let reason = match position.get(dep_id.as_str()) {
                None => "not installed",
                Some(&dep_index) => {
                    let dep = &session.order.entries()[dep_index];
                    if !dep.enabled {
                        "disabled"
                    } else if dep_index >= index {
                        "loads later"
                    } else {
                        continue;
                    }
                }
            };
            missing.push(MissingDependencyItem {
                required_by: entry.display_name().to_string(),
                required_by_id: entry.id.clone(),
                dependency_id: dep_id.clone(),
                reason: reason.to_string(),
            });
        }
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&missing)?);
        }
        OutputFormat::Text => {
            if missing.is_empty() {
                println!("No missing dependencies detected.");
            } else {
                for item in missing {
                    println!(
                        "{} -> {} ({})",
                        item.required_by, item.dependency_id, item.reason
                    );
                }
            }
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct ConflictItem {
    id: String,
    name: String,
}

fn report_conflicts(session: &mut Session, format: OutputFormat) -> Result<()> {
    session.order.validate();
    let flagged: Vec<ConflictItem> = session
        .order
        .entries()
        .iter()
        .filter(|entry| entry.has_conflicts)
        .map(|entry| ConflictItem {
            id: entry.id.clone(),
            name: entry.display_name().to_string(),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&flagged)?);
        }
        OutputFormat::Text => {
            if flagged.is_empty() {
                println!("No conflicts detected.");
            } else {
                println!("{} mod(s) have conflicts:", flagged.len());
                for item in flagged {
                    println!("  {} ({})", item.name, item.id);
                }
                println!("Run `bannersmith deps missing` for details.");
            }
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct PathsOutput {
    game_root: String,
    modules_dir: String,
    bin_dir: String,
    data_dir: String,
}

fn list_paths(session: &Session, format: OutputFormat) -> Result<()> {
    let output = PathsOutput {
        game_root: session.paths.game_root.display().to_string(),
        modules_dir: session.paths.modules_dir.display().to_string(),
        bin_dir: session.paths.bin_dir.display().to_string(),
        data_dir: session.data_dir.display().to_string(),
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("Game root: {}", output.game_root);
            println!("Modules: {}", output.modules_dir);
            println!("Binaries: {}", output.bin_dir);
            println!("Data dir: {}", output.data_dir);
        }
    }

    Ok(())
}

fn print_help() {
    println!("BannerSmith v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  bannersmith                     List mods in load order");
    println!("  bannersmith mods                List mods (--sort order|name, --reverse, --filter <text>)");
    println!("  bannersmith deps list           List declared dependencies");
    println!("  bannersmith deps missing        List unmet dependencies");
    println!("  bannersmith sort topo           Reorder so dependencies load first");
    println!("  bannersmith sort alpha          Sort by name");
    println!("  bannersmith sort reverse        Reverse the order");
    println!("  bannersmith move <id> --up|--down|--top|--bottom|--to <position>");
    println!("  bannersmith enable <id>|--all   Enable mods");
    println!("  bannersmith disable <id>|--all  Disable mods");
    println!("  bannersmith invert              Invert every enabled flag");
    println!("  bannersmith validate            Report mods with conflicts");
    println!("  bannersmith paths               Show detected paths");
    println!();
    println!("Global options:");
    println!("  --format <json|text>            Output format for list commands");
    println!("  --force                         Save even if conflicts remain");
    println!("  -h, --help                      Show help");
    println!("  -V, --version                   Show version");
}
