use clap::Parser;
use miette::IntoDiagnostic;
use miette::miette;
use stencil_lang::directive::{DataViewDirective, MapValuesDirective};
use stencil_lang::{Context, Engine, Options, Registry, Value};
use std::io::{self, BufWriter, IsTerminal, Read, Write};
use std::{fs, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Default)]
#[command(name = "stencil")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To resolve a template against a context file:\n\
    stencil --context context.json template.json\n\n\
    ## To read the template from stdin:\n\
    echo '{\"$use\": \"+\", \"args\": [1, 2]}' | stencil -\n\n\
    ## To print the optimized template:\n\
    stencil --optimize-only template.json")]
#[command(
    about = "stencil resolves JSON templates whose `$use` objects are directive invocations.",
    long_about = None
)]
pub struct Cli {
    #[clap(flatten)]
    input: InputArgs,

    #[clap(flatten)]
    output: OutputArgs,

    #[clap(flatten)]
    engine: EngineArgs,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Template file, or `-` to read it from stdin
    #[arg(value_name = "TEMPLATE")]
    template: Option<String>,
}

#[derive(Clone, Debug, clap::Args, Default)]
struct InputArgs {
    /// Load the context from a JSON file
    #[arg(short, long, value_name = "FILE", conflicts_with = "context_json")]
    context: Option<PathBuf>,

    /// Use the given JSON text as the context
    #[arg(long, value_name = "JSON")]
    context_json: Option<String>,

    /// Bind a string local variable that templates can read with `getVar`
    #[arg(long = "var", value_names = ["NAME", "VALUE"], num_args = 2, action = clap::ArgAction::Append)]
    vars: Option<Vec<String>>,

    /// Register the opt-in `present` and `map` directives
    #[arg(long, default_value_t = false)]
    extras: bool,
}

#[derive(Clone, Debug, clap::Args, Default)]
struct OutputArgs {
    /// Optimize the template before resolving it
    #[arg(long, default_value_t = false)]
    optimize: bool,

    /// Print the optimized template and whether it is executable, without resolving
    #[arg(long, default_value_t = false, conflicts_with = "optimize")]
    optimize_only: bool,

    /// Print JSON on a single line
    #[arg(long, default_value_t = false)]
    compact: bool,
}

#[derive(Clone, Debug, clap::Args, Default)]
struct EngineArgs {
    /// Key that marks an object as a directive invocation
    #[arg(long, value_name = "KEY")]
    directive_key: Option<String>,

    /// Context key holding the local variables
    #[arg(long, value_name = "KEY")]
    vars_key: Option<String>,

    /// Context key holding the resolution state
    #[arg(long, value_name = "KEY")]
    resolving_key: Option<String>,

    /// Maximum nesting depth before resolution fails
    #[arg(long, value_name = "DEPTH")]
    max_depth: Option<u32>,
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        self.init_tracing();

        let engine = self.create_engine();
        let template = self.read_template()?;

        if self.output.optimize_only {
            let optimized = engine.optimize(&template).into_diagnostic()?;
            let json = serde_json::json!({
                "executable": optimized.executable,
                "template": optimized.value.to_json().into_diagnostic()?,
            });
            return self.print(&json);
        }

        let template = if self.output.optimize {
            let optimized = engine.optimize(&template).into_diagnostic()?;
            tracing::info!(executable = optimized.executable, "template optimized");
            optimized.value
        } else {
            template
        };

        let context = self.create_context(&engine)?;
        let resolved = engine.resolve(&template, &context).into_diagnostic()?;
        self.print(&resolved.to_json().into_diagnostic()?)
    }

    /// `RUST_LOG` takes precedence over `-v`.
    fn init_tracing(&self) {
        let level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    }

    fn create_engine(&self) -> Engine {
        let defaults = Options::default();
        let options = Options {
            directive_key: self
                .engine
                .directive_key
                .as_deref()
                .map_or(defaults.directive_key, Into::into),
            local_variables_key: self
                .engine
                .vars_key
                .as_deref()
                .map_or(defaults.local_variables_key, Into::into),
            resolution_state_key: self
                .engine
                .resolving_key
                .as_deref()
                .map_or(defaults.resolution_state_key, Into::into),
            max_depth: self.engine.max_depth.unwrap_or(defaults.max_depth),
        };

        let mut registry = Registry::standard();
        if self.input.extras {
            registry
                .register("present", DataViewDirective)
                .register("map", MapValuesDirective);
        }
        tracing::debug!(directives = registry.len(), "registry ready");

        Engine::with_options(registry, options)
    }

    fn read_template(&self) -> miette::Result<Value> {
        let text = match self.template.as_deref() {
            Some("-") => read_stdin()?,
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(miette!("File not found: {}", path.display()));
                }
                fs::read_to_string(&path).into_diagnostic()?
            }
            None if !io::stdin().is_terminal() => read_stdin()?,
            None => return Err(miette!("Template is required")),
        };

        parse_json(&text, "template")
    }

    fn create_context(&self, engine: &Engine) -> miette::Result<Context> {
        let value = match (&self.input.context, &self.input.context_json) {
            (Some(path), _) => {
                if !path.exists() {
                    return Err(miette!("File not found: {}", path.display()));
                }
                parse_json(&fs::read_to_string(path).into_diagnostic()?, "context")?
            }
            (None, Some(text)) => parse_json(text, "context")?,
            (None, None) => Value::None,
        };
        let context = Context::try_from(value).into_diagnostic()?;

        if let Some(vars) = &self.input.vars {
            let key = &engine.options().local_variables_key;
            if !context.get(key).is_container() {
                context.insert(key.clone(), Value::empty_object());
            }
            for pair in vars.chunks(2) {
                if let [name, value] = pair {
                    engine.set_local_value(&context, name, Value::from(value.as_str()));
                }
            }
        }

        Ok(context)
    }

    fn print(&self, json: &serde_json::Value) -> miette::Result<()> {
        let mut handle = BufWriter::new(io::stdout().lock());
        if self.output.compact {
            serde_json::to_writer(&mut handle, json).into_diagnostic()?;
        } else {
            serde_json::to_writer_pretty(&mut handle, json).into_diagnostic()?;
        }
        writeln!(handle).into_diagnostic()?;
        handle.flush().into_diagnostic()
    }
}

fn read_stdin() -> miette::Result<String> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input).into_diagnostic()?;
    Ok(input)
}

fn parse_json(text: &str, what: &str) -> miette::Result<Value> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .map_err(|e| miette!("Invalid {} JSON: {}", what, e))
}
