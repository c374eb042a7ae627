use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use pic_agent::audit::AuditLog;
use pic_agent::conflicts::{
    ConflictInput, ConflictProtocol, Position, ResolutionInput, ResolutionOutcome,
};
use pic_agent::decisions::{
    DecisionInput, DecisionProtocol, DecisionTier, Evidence, EvidenceStrength,
};
use pic_agent::hooks::LifecycleHooks;
use pic_agent::paths::PicPaths;
use pic_agent::phase::{Phase, ViolationSeverity};
use pic_agent::state_store::StateStore;
use pic_agent::transition::{ExitCriterion, HandoffOutcome, HandoffRequest, TransitionEngine};

#[derive(Parser)]
#[command(name = "pic")]
#[command(about = "Workflow coordination engine for phase-owned multi-agent work")]
#[command(version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("PIC_AGENT_GIT_SHA"),
    ")"
))]
struct Cli {
    /// Working directory holding the workspace (defaults to the current
    /// directory)
    #[arg(long, global = true)]
    working_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a new workflow for a problem statement
    Init {
        /// The problem - all arguments are joined
        #[arg(trailing_var_arg = true, required = true)]
        problem: Vec<String>,

        /// Archive the existing workflow and start fresh
        #[arg(long)]
        archive_and_restart: bool,
    },

    /// Show the current workflow state
    Status {
        /// Print the raw state document as JSON
        #[arg(long)]
        json: bool,
    },

    /// Complete the current phase and hand off to the next
    Handoff(HandoffArgs),

    /// Record a decision at a declared tier
    Decision(DecisionArgs),

    /// Open or resolve a conflict
    Conflict {
        #[command(subcommand)]
        action: ConflictAction,
    },

    /// Lifecycle hook callbacks fired by the agent invoker
    Hook {
        #[command(subcommand)]
        event: HookEvent,
    },

    /// Report a capability violation observed during a phase
    Violation {
        #[arg(long)]
        actor: String,
        /// minor, major, or critical
        #[arg(long)]
        severity: String,
        #[arg(long)]
        description: String,
    },

    /// Clear a blocked workflow after human review
    Unblock {
        #[arg(long)]
        operator: String,
    },

    /// Print the last N audit entries
    Tail {
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,
    },
}

#[derive(Args)]
struct HandoffArgs {
    /// The phase being handed off (must be the current phase)
    phase: String,

    /// Exit criterion as name=met or name=not_met (repeatable)
    #[arg(long = "criterion")]
    criteria: Vec<String>,

    /// Criterion names that are not required
    #[arg(long = "optional")]
    optional: Vec<String>,

    /// Deliverable produced by this phase (repeatable)
    #[arg(long = "deliverable")]
    deliverables: Vec<String>,

    #[arg(long, default_value = "")]
    notes: String,

    /// Supersede an existing handoff record for this phase pair
    #[arg(long)]
    supersede: bool,

    /// Skip ahead to a later phase (requires --skip-rationale)
    #[arg(long)]
    skip_to: Option<String>,

    #[arg(long)]
    skip_rationale: Option<String>,
}

#[derive(Args)]
struct DecisionArgs {
    /// formal, lightweight, or implicit
    #[arg(long)]
    tier: String,

    #[arg(long, default_value = "")]
    title: String,

    /// Alternative considered (repeatable)
    #[arg(long = "alternative")]
    alternatives: Vec<String>,

    #[arg(long, default_value = "")]
    rationale: String,

    /// Evidence as strength:summary, strength in weak|moderate|strong
    /// (repeatable)
    #[arg(long = "evidence")]
    evidence: Vec<String>,

    /// Id of the decision this one supersedes
    #[arg(long)]
    supersedes: Option<String>,

    /// Promote an existing decision to this tier instead of filing a
    /// fresh one
    #[arg(long)]
    promote: Option<String>,
}

#[derive(Subcommand)]
enum ConflictAction {
    /// Open a conflict between two or more positions
    Open {
        /// technical, scope, priority, or process (or A-D)
        #[arg(long)]
        category: String,

        /// Position as holder:summary (repeatable, at least two)
        #[arg(long = "position")]
        positions: Vec<String>,

        /// Comma-separated phases whose exit this conflict blocks
        #[arg(long, default_value = "")]
        stakes: String,

        /// Id of the resolved conflict this one reopens
        #[arg(long)]
        supersedes: Option<String>,
    },

    /// Resolve an open conflict
    Resolve {
        id: String,

        /// position-a, position-b, or synthesis
        #[arg(long)]
        outcome: String,

        /// The chosen or synthesized position
        #[arg(long)]
        chosen: String,

        #[arg(long)]
        rationale: String,

        #[arg(long)]
        decider: String,
    },
}

#[derive(Subcommand)]
enum HookEvent {
    /// An agent is starting
    AgentStart {
        #[arg(long)]
        token: String,
        #[arg(long)]
        actor: String,
        /// Prompt payload file; stdin when omitted
        #[arg(long)]
        prompt_file: Option<PathBuf>,
    },

    /// An agent has completed
    AgentComplete {
        #[arg(long)]
        token: String,
        #[arg(long)]
        actor: String,
        /// Output payload file; stdin when omitted
        #[arg(long)]
        output_file: Option<PathBuf>,
    },

    /// A tool was used
    ToolUse {
        #[arg(long)]
        tool: String,
        #[arg(long, default_value = "")]
        input: String,
        #[arg(long, default_value = "")]
        output: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let working_dir = match cli.working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot determine working directory")?,
    };
    let paths = PicPaths::new(&working_dir);

    match cli.command {
        Command::Init {
            problem,
            archive_and_restart,
        } => {
            let problem = problem.join(" ");
            let state = StateStore::new(&paths).initialize(&problem, archive_and_restart)?;
            println!("initialized workflow {}", state.id);
            println!(
                "phase {} in progress, owned by {}",
                Phase::first(),
                Phase::first().role()
            );
            Ok(())
        }

        Command::Status { json } => {
            let state = StateStore::new(&paths).read()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
                return Ok(());
            }
            println!("workflow {} (revision {})", state.id, state.revision);
            println!("problem: {}", state.problem);
            if state.blocked {
                println!("BLOCKED - explicit unblock required");
            }
            for phase in Phase::ORDER {
                let marker = if state.current_phase == Some(phase) {
                    ">"
                } else {
                    " "
                };
                println!(
                    "{} {:<15} {}",
                    marker,
                    phase.as_str(),
                    state.status_of(phase).as_str()
                );
            }
            println!(
                "decisions: {}  conflicts: {}  handoffs: {}",
                state.decisions.len(),
                state.conflicts.len(),
                state.handoffs.len()
            );
            Ok(())
        }

        Command::Handoff(args) => {
            let current_phase: Phase = args.phase.parse().map_err(|e: String| anyhow!(e))?;
            let criteria = args
                .criteria
                .iter()
                .map(|raw| parse_criterion(raw, &args.optional))
                .collect::<Result<Vec<_>>>()?;
            let skip_to = args
                .skip_to
                .as_deref()
                .map(|s| s.parse::<Phase>().map_err(|e| anyhow!(e)))
                .transpose()?;

            let engine = TransitionEngine::new(&paths);
            let outcome = engine.handoff(HandoffRequest {
                current_phase,
                criteria,
                deliverables: args.deliverables,
                notes: args.notes,
                supersede: args.supersede,
                skip_to,
                skip_rationale: args.skip_rationale,
            })?;
            match outcome {
                HandoffOutcome::Advanced { record, next_actor } => {
                    println!(
                        "handoff recorded: {} -> {}",
                        record.from_phase, record.to_phase
                    );
                    println!(
                        "next actor: {} with capabilities {:?}",
                        next_actor.role, next_actor.capabilities
                    );
                }
                HandoffOutcome::Completed(summary) => {
                    println!("workflow complete");
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
            }
            Ok(())
        }

        Command::Decision(args) => {
            let tier: DecisionTier = args.tier.parse().map_err(|e: String| anyhow!(e))?;
            let evidence = args
                .evidence
                .iter()
                .map(|raw| parse_evidence(raw))
                .collect::<Result<Vec<_>>>()?;
            let protocol = DecisionProtocol::new(&paths);
            let record = match args.promote {
                Some(old_id) => protocol.promote(
                    &old_id,
                    tier,
                    args.alternatives,
                    evidence,
                    if args.rationale.is_empty() {
                        None
                    } else {
                        Some(args.rationale)
                    },
                )?,
                None => protocol.record(DecisionInput {
                    tier,
                    title: args.title,
                    alternatives: args.alternatives,
                    rationale: args.rationale,
                    evidence,
                    supersedes: args.supersedes,
                })?,
            };
            println!("recorded {} [{}]", record.id, record.tier.as_str());
            Ok(())
        }

        Command::Conflict { action } => {
            let protocol = ConflictProtocol::new(&paths);
            match action {
                ConflictAction::Open {
                    category,
                    positions,
                    stakes,
                    supersedes,
                } => {
                    let record = protocol.open(ConflictInput {
                        category: category.parse().map_err(|e: String| anyhow!(e))?,
                        positions: positions
                            .iter()
                            .map(|raw| parse_position(raw))
                            .collect::<Result<Vec<_>>>()?,
                        stakes: parse_stakes(&stakes)?,
                        supersedes,
                    })?;
                    println!(
                        "opened {} [category {}]",
                        record.id,
                        record.category.letter()
                    );
                }
                ConflictAction::Resolve {
                    id,
                    outcome,
                    chosen,
                    rationale,
                    decider,
                } => {
                    let outcome: ResolutionOutcome =
                        outcome.parse().map_err(|e: String| anyhow!(e))?;
                    let record = protocol.resolve(
                        &id,
                        ResolutionInput {
                            outcome,
                            chosen_position: chosen,
                            rationale,
                            decider,
                        },
                    )?;
                    println!("resolved {}", record.id);
                }
            }
            Ok(())
        }

        Command::Hook { event } => {
            let hooks = LifecycleHooks::new(&paths);
            match event {
                HookEvent::AgentStart {
                    token,
                    actor,
                    prompt_file,
                } => {
                    let prompt = read_payload(prompt_file)?;
                    hooks.on_agent_start(&token, &actor, &prompt);
                }
                HookEvent::AgentComplete {
                    token,
                    actor,
                    output_file,
                } => {
                    let output = read_payload(output_file)?;
                    hooks.on_agent_complete(&token, &actor, &output);
                }
                HookEvent::ToolUse {
                    tool,
                    input,
                    output,
                } => {
                    hooks.on_tool_use(&tool, &input, &output);
                }
            }
            Ok(())
        }

        Command::Violation {
            actor,
            severity,
            description,
        } => {
            let severity: ViolationSeverity = severity.parse().map_err(|e: String| anyhow!(e))?;
            TransitionEngine::new(&paths).report_violation(&actor, severity, &description)?;
            println!("violation recorded ({:?})", severity);
            Ok(())
        }

        Command::Unblock { operator } => {
            let state = TransitionEngine::new(&paths).clear_block(&operator)?;
            println!("workflow {} unblocked", state.id);
            Ok(())
        }

        Command::Tail { count } => {
            let entries = AuditLog::new(&paths).tail(count)?;
            for entry in entries {
                println!("{}", serde_json::to_string(&entry)?);
            }
            Ok(())
        }
    }
}

fn parse_criterion(raw: &str, optional: &[String]) -> Result<ExitCriterion> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("criterion must be name=met or name=not_met: {}", raw))?;
    let met = match value {
        "met" => true,
        "not_met" => false,
        other => return Err(anyhow!("criterion value must be met or not_met: {}", other)),
    };
    let required = !optional.iter().any(|o| o == name);
    Ok(ExitCriterion {
        name: name.to_string(),
        required,
        met,
    })
}

fn parse_evidence(raw: &str) -> Result<Evidence> {
    let (strength, summary) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("evidence must be strength:summary: {}", raw))?;
    let strength = match strength {
        "weak" => EvidenceStrength::Weak,
        "moderate" => EvidenceStrength::Moderate,
        "strong" => EvidenceStrength::Strong,
        other => return Err(anyhow!("unknown evidence strength: {}", other)),
    };
    Ok(Evidence {
        summary: summary.to_string(),
        strength,
    })
}

fn parse_position(raw: &str) -> Result<Position> {
    let (holder, summary) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("position must be holder:summary: {}", raw))?;
    Ok(Position {
        holder: holder.to_string(),
        summary: summary.to_string(),
    })
}

fn parse_stakes(raw: &str) -> Result<Vec<Phase>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|s| s.trim().parse::<Phase>().map_err(|e| anyhow!(e)))
        .collect()
}

fn read_payload(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read payload file: {}", path.display())),
        None => std::io::read_to_string(std::io::stdin()).context("failed to read stdin"),
    }
}
