//! vtcall command line
//!
//! ```text
//! vtcall [OPTIONS] selftest
//! vtcall [OPTIONS] latebind <ProgID> <Method> [ARGS...]
//! ```

use std::path::PathBuf;
use tracing::{debug, error, info};
use vtcall::com::{clsid_from_prog_id, create_instance, Apartment, Dispatch, Variant};
use vtcall::fake::{Echo, FakeHeap, SPAWN_CHILD};
use vtcall::harness::{Context, FrameScript, ScriptArg, ScriptedPump};
use vtcall::interop::Arg;
use vtcall::logging::{self, LogConfig};
use vtcall::{Config, DispatchError, Error, ResultCode};

#[derive(Debug, Clone, PartialEq)]
enum Command {
    SelfTest { frames: usize },
    LateBind {
        prog_id: String,
        method: String,
        args: Vec<String>,
    },
}

#[derive(Debug)]
struct CliConfig {
    config_path: Option<PathBuf>,
    verbose: bool,
    command: Command,
}

impl CliConfig {
    fn from_args(args: &[String]) -> Result<Self, String> {
        let prog = args.first().map(String::as_str).unwrap_or("vtcall");
        let mut config_path = None;
        let mut verbose = false;
        let mut frames = 3;
        let mut positional = Vec::new();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--help" | "-h" => return Err(Self::usage(prog)),
                "--verbose" | "-v" => verbose = true,
                "--config" => {
                    i += 1;
                    let path = args
                        .get(i)
                        .ok_or_else(|| "--config requires an argument".to_string())?;
                    config_path = Some(PathBuf::from(path));
                }
                "--frames" => {
                    i += 1;
                    frames = args
                        .get(i)
                        .ok_or_else(|| "--frames requires an argument".to_string())?
                        .parse()
                        .map_err(|_| "Invalid value for --frames".to_string())?;
                }
                opt if opt.starts_with("--") => {
                    return Err(format!("Unknown option: {}\n\n{}", opt, Self::usage(prog)));
                }
                arg => positional.push(arg.to_string()),
            }
            i += 1;
        }

        let mut positional = positional.into_iter();
        let command = match positional.next().as_deref() {
            Some("selftest") => Command::SelfTest { frames },
            Some("latebind") => {
                let prog_id = positional
                    .next()
                    .ok_or_else(|| "latebind requires a ProgID".to_string())?;
                let method = positional
                    .next()
                    .ok_or_else(|| "latebind requires a method name".to_string())?;
                Command::LateBind {
                    prog_id,
                    method,
                    args: positional.collect(),
                }
            }
            Some(other) => {
                return Err(format!("Unknown command: {}\n\n{}", other, Self::usage(prog)))
            }
            None => return Err(Self::usage(prog)),
        };

        Ok(Self {
            config_path,
            verbose,
            command,
        })
    }

    fn usage(prog: &str) -> String {
        format!(
            "vtcall - dynamic dispatch over vtable objects\n\n\
            USAGE:\n    {} [OPTIONS] <COMMAND>\n\n\
            COMMANDS:\n    \
            selftest                          Drive in-process fake objects\n    \
            latebind <ProgID> <Method> [ARGS] Call an automation method by name\n\n\
            OPTIONS:\n    \
            -h, --help        Print help information\n    \
            -v, --verbose     Debug logging\n    \
            --config <PATH>   Configuration file (default: search for vtcall.toml)\n    \
            --frames <N>      Frames run by selftest (default: 3)\n\n\
            EXAMPLES:\n    \
            {} selftest\n    \
            {} latebind WScript.Shell Popup \"hello\" 0",
            prog, prog, prog
        )
    }
}

struct Cli {
    config: Config,
    command: Command,
}

impl Cli {
    fn new(config: Config, command: Command) -> Self {
        Self { config, command }
    }

    fn run(&self) -> Result<i32, Error> {
        match &self.command {
            Command::SelfTest { frames } => self.self_test(*frames),
            Command::LateBind {
                prog_id,
                method,
                args,
            } => self.late_bind(prog_id, method, args),
        }
    }

    fn self_test(&self, frames: usize) -> Result<i32, Error> {
        // heap first: it must outlive every object below
        let heap = FakeHeap::new();
        let mut ctx = Context::new(self.config.clone());

        let root = heap
            .adopt::<Echo>(heap.echo())
            .ok_or(DispatchError::NoObject {
                interface: "IVtcallEcho",
                method: "QueryInterface",
                code: ResultCode::E_NOINTERFACE,
            })?;
        // SAFETY: the fake's Spawn hands back an echo object with one reference
        let child =
            unsafe { root.create::<Echo>("Spawn", &[Arg::from(0i32), Arg::from(SPAWN_CHILD)])? }
                .into_result("IVtcallEcho", "Spawn")?;

        let root = ctx.adopt(root);
        let child = ctx.adopt(child);

        let mut script = FrameScript::new();
        script
            .push(root, "Echo2", vec![ScriptArg::Usize(40), ScriptArg::Usize(2)])?
            .push_checked(child, "Echo1", vec![ScriptArg::Usize(7)])?;

        let setup_calls = heap.calls().len();
        let mut pump = ScriptedPump::frames(frames);
        let code = ctx.run(&mut pump, &script)?;
        drop(ctx);

        let calls = heap.calls().len() - setup_calls;
        let violations = heap.violations();
        println!("frames:     {}", frames);
        println!("calls:      {}", calls);
        println!("destroyed:  {:?}", heap.destroyed());
        println!("live:       {}", heap.live_count());

        if violations.is_empty() && heap.live_count() == 0 && calls == frames * script.len() {
            println!("selftest passed");
            Ok(code)
        } else {
            for violation in &violations {
                eprintln!("violation: {:?}", violation);
            }
            eprintln!("selftest failed");
            Ok(1)
        }
    }

    fn late_bind(&self, prog_id: &str, method: &str, args: &[String]) -> Result<i32, Error> {
        let _apartment = Apartment::initialize(self.config.com.apartment)?;
        let clsid = clsid_from_prog_id(prog_id)?;
        let object =
            create_instance::<Dispatch>(&clsid)?.into_result("IDispatch", "CoCreateInstance")?;

        let variants = args
            .iter()
            .map(|arg| match arg.parse::<i32>() {
                Ok(v) => Ok(Variant::i4(v)),
                Err(_) => match arg.parse::<f64>() {
                    Ok(v) => Ok(Variant::r8(v)),
                    Err(_) => Variant::string(arg),
                },
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(prog_id, method, args = variants.len(), "late-bound call");
        let result = object.invoke_method(method, variants)?;
        debug!(?result, "late-bound result");

        if let Some(v) = result.as_i4() {
            println!("{}", v);
        } else if let Some(v) = result.as_r8() {
            println!("{}", v);
        } else if let Some(v) = result.as_bool() {
            println!("{}", v);
        } else if let Some(v) = result.as_string() {
            println!("{}", v);
        } else if !result.is_empty() {
            println!("{:?}", result);
        }
        Ok(0)
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let cli_config = match CliConfig::from_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let config = match &cli_config.config_path {
        Some(path) => Config::load(path),
        None => Config::discover(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let log_config = if cli_config.verbose {
        LogConfig::verbose()
    } else {
        config.log_config()
    };
    let _guard = logging::init_with_config(log_config);
    debug!(command = ?cli_config.command, "configuration loaded");

    let cli = Cli::new(config, cli_config.command);
    match cli.run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_selftest() {
        let cfg = CliConfig::from_args(&args(&["vtcall", "--verbose", "selftest", "--frames", "5"]))
            .unwrap();
        assert!(cfg.verbose);
        assert_eq!(cfg.command, Command::SelfTest { frames: 5 });
    }

    #[test]
    fn test_parse_latebind() {
        let cfg = CliConfig::from_args(&args(&[
            "vtcall", "--config", "x.toml", "latebind", "A.B", "Add", "1", "-2",
        ]))
        .unwrap();
        assert_eq!(cfg.config_path, Some(PathBuf::from("x.toml")));
        assert_eq!(
            cfg.command,
            Command::LateBind {
                prog_id: "A.B".into(),
                method: "Add".into(),
                args: vec!["1".into(), "-2".into()],
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(CliConfig::from_args(&args(&["vtcall"])).is_err());
        assert!(CliConfig::from_args(&args(&["vtcall", "--bogus", "selftest"])).is_err());
        assert!(CliConfig::from_args(&args(&["vtcall", "latebind", "A.B"])).is_err());
        assert!(CliConfig::from_args(&args(&["vtcall", "frobnicate"])).is_err());
        assert!(CliConfig::from_args(&args(&["vtcall", "--config"])).is_err());
    }

    #[test]
    fn test_selftest_passes() {
        let cli = Cli::new(Config::default(), Command::SelfTest { frames: 2 });
        assert_eq!(cli.run().unwrap(), 0);
    }
}
