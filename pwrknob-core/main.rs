use clap::{Parser, Subcommand};

use pwrknob::props::ValueRecord;
use pwrknob::{MechanismId, PowerKnobs, TargetSpec};

#[derive(Parser, Debug)]
#[command(name = "pwrknob")]
#[command(about = "Read and modify Intel power-management knobs", version)]
struct Args {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(long, global = true, help = "Disable the property result cache")]
    no_cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the known properties and their mechanisms
    List,

    /// Read a property
    Get {
        /// Property name, e.g. 'turbo' or 'epb'
        property: String,

        #[arg(
            long,
            default_value = "all",
            help = "Target CPUs, e.g. '0-3,8' or 'all'"
        )]
        cpus: String,

        #[arg(long, help = "Read per package: a package number")]
        package: Option<u32>,

        #[arg(long, requires = "package", help = "Read one die of --package")]
        die: Option<u32>,

        #[arg(
            long,
            value_delimiter = ',',
            help = "Mechanisms to try in order, e.g. 'sysfs,msr'"
        )]
        mechanisms: Option<Vec<String>>,
    },

    /// Modify a property
    Set {
        property: String,

        /// New value: 'on'/'off' for booleans, numbers with optional SI
        /// units ('100MHz') or policy names where supported
        value: String,

        #[arg(long, default_value = "all")]
        cpus: String,

        #[arg(long)]
        package: Option<u32>,

        #[arg(long, requires = "package")]
        die: Option<u32>,

        #[arg(long, value_delimiter = ',')]
        mechanisms: Option<Vec<String>>,
    },
}

fn parse_mechanisms(names: Option<&Vec<String>>) -> anyhow::Result<Option<Vec<MechanismId>>> {
    let Some(names) = names else {
        return Ok(None);
    };

    let mut mechs = Vec::with_capacity(names.len());
    for name in names {
        let mech = MechanismId::from_name(name)
            .ok_or_else(|| anyhow::anyhow!("unknown mechanism '{name}'"))?;
        mechs.push(mech);
    }
    Ok(Some(mechs))
}

fn print_record(record: &ValueRecord) {
    match (&record.value, record.mechanism) {
        (Some(value), Some(mech)) => {
            println!("{}: {value} (via {})", record.target, mech.name())
        }
        _ => println!("{}: not supported", record.target),
    }
}

fn list_properties(knobs: &PowerKnobs) {
    for prop in knobs.registry().properties() {
        if !prop.supported {
            continue;
        }
        let mechs: Vec<&str> = prop.mechanisms.iter().map(|m| m.name()).collect();
        println!(
            "{:<18} {:<10} {:<34} mechanisms: {}{}",
            prop.id.name(),
            prop.scope.name(),
            prop.name,
            mechs.join(", "),
            if prop.writable { "" } else { " (read-only)" },
        );
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let mut knobs = PowerKnobs::builder()
        .enable_cache(!args.no_cache)
        .build()?;

    match &args.command {
        Command::List => list_properties(&knobs),

        Command::Get {
            property,
            cpus,
            package,
            die,
            mechanisms,
        } => {
            let id = knobs.registry().resolve(property)?.id;
            let mechanisms = parse_mechanisms(mechanisms.as_ref())?;
            let mechanisms = mechanisms.as_deref();

            match (package, die) {
                (Some(package), Some(die)) => {
                    print_record(&knobs.get_die_prop(id, *package, *die, mechanisms)?)
                }
                (Some(package), None) => {
                    print_record(&knobs.get_package_prop(id, *package, mechanisms)?)
                }
                _ => {
                    let spec = TargetSpec::parse(cpus)?;
                    for record in knobs.get_prop_cpus(id, &spec, mechanisms)? {
                        print_record(&record);
                    }
                }
            }
        }

        Command::Set {
            property,
            value,
            cpus,
            package,
            die,
            mechanisms,
        } => {
            let id = knobs.registry().resolve(property)?.id;
            let mechanisms = parse_mechanisms(mechanisms.as_ref())?;
            let mechanisms = mechanisms.as_deref();

            let mech = match (package, die) {
                (Some(package), Some(die)) => {
                    knobs.set_die_prop(id, value, *package, *die, mechanisms)?
                }
                (Some(package), None) => {
                    knobs.set_package_prop(id, value, *package, mechanisms)?
                }
                _ => {
                    let spec = TargetSpec::parse(cpus)?;
                    knobs.set_prop_cpus(id, value, &spec, mechanisms)?
                }
            };
            println!("set '{property}' to '{value}' via '{}'", mech.name());
        }
    }

    Ok(())
}
