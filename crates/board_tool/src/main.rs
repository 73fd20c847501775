use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use board::{BoardConfig, GridOffsets, SceneId};
use board_tool::{parse_map_size, parse_offset, parse_role, run, CommandKind, FogCellsOptions};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_tracing();
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        print_usage();
        return Ok(());
    }

    let config = BoardConfig::from_env().map_err(|error| error.to_string())?;
    let command = args[0].as_str();
    let command_args = &args[1..];

    let kind = match command {
        "inspect" => parse_inspect(command_args)?,
        "fog-cells" => parse_fog_cells(command_args)?,
        "normalize" => {
            if command_args.len() != 2 {
                return Err("normalize requires <in.json> <out.json>".to_string());
            }
            CommandKind::Normalize {
                input: PathBuf::from(&command_args[0]),
                output: PathBuf::from(&command_args[1]),
            }
        }
        other => return Err(format!("unknown subcommand '{other}'")),
    };

    run(kind, &config, &mut io::stdout())
}

fn parse_inspect(args: &[String]) -> Result<CommandKind, String> {
    let mut path = None;
    let mut json = false;
    for arg in args {
        match arg.as_str() {
            "--json" => json = true,
            flag if flag.starts_with("--") => {
                return Err(format!("unknown inspect argument '{flag}' (expected --json)"))
            }
            value if path.is_none() => path = Some(PathBuf::from(value)),
            extra => return Err(format!("unexpected inspect argument '{extra}'")),
        }
    }
    let path = path.ok_or_else(|| "inspect requires a board file path".to_string())?;
    Ok(CommandKind::Inspect { path, json })
}

fn parse_fog_cells(args: &[String]) -> Result<CommandKind, String> {
    let path = args
        .first()
        .map(PathBuf::from)
        .ok_or_else(|| "fog-cells requires a board file path".to_string())?;

    let mut scene = None;
    let mut map = None;
    let mut grid_size = None;
    let mut offset = GridOffsets::default();
    let mut role = None;
    let mut index = 1usize;
    while index < args.len() {
        let flag = args[index].as_str();
        let value = args
            .get(index + 1)
            .ok_or_else(|| format!("missing value for {flag}"))?;
        match flag {
            "--scene" => scene = Some(SceneId::new(value.as_str())),
            "--map" => map = Some(parse_map_size(value)?),
            "--grid" => {
                grid_size = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| format!("invalid --grid value '{value}' (expected u32)"))?,
                );
            }
            "--offset" => offset = parse_offset(value)?,
            "--role" => role = Some(parse_role(value)?),
            other => return Err(format!("unknown fog-cells argument '{other}'")),
        }
        index += 2;
    }

    Ok(CommandKind::FogCells {
        path,
        options: FogCellsOptions {
            scene: scene.ok_or_else(|| "fog-cells requires --scene <id>".to_string())?,
            map: map.ok_or_else(|| "fog-cells requires --map <WIDTHxHEIGHT>".to_string())?,
            grid_size,
            offset,
            role,
        },
    })
}

fn print_usage() {
    println!("{}", usage_text());
}

fn usage_text() -> String {
    [
        "board_tool - battle-map board file inspector",
        "",
        "Usage:",
        "  board_tool inspect <board.json> [--json]",
        "  board_tool fog-cells <board.json> --scene <id> --map <WxH> [--grid <px>] [--offset <L,T>] [--role gm|player]",
        "  board_tool normalize <in.json> <out.json>",
        "",
        "Environment:",
        "  BATTLEMAP_PLAYER_FOLDER       player-visible token folder (default \"Player Characters\")",
        "  BATTLEMAP_ROLE                gm|player (default player)",
        "  BATTLEMAP_PERSIST_DEBOUNCE_MS persist debounce in ms (default 750)",
        "  RUST_LOG                      log filter, written to stderr (default info)",
    ]
    .join("\n")
}
