use std::path::PathBuf;

use anyhow::Context as _;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod context;
mod db;
mod digest;
mod error;
mod models;
mod performance;
mod reports;
mod store;
mod suspension;
mod tasks;
mod users;

use crate::config::Config;
use crate::context::{Context, NoticeKind, Policy};
use crate::models::{
    IssueType, Location, NewPerformanceReport, NewReport, NewUser, PerformanceReportType, Report,
    ReportStatus, Role, TaskStatus,
};
use crate::reports::{InstantOutcome, ReportFilter};
use crate::store::{MemoryStore, Store};
use crate::tasks::TaskFilter;
use crate::users::UserFilter;

#[derive(Parser)]
#[command(name = "waste-reporting")]
#[command(about = "Municipal waste reporting for citizens, moderators and volunteers", long_about = None)]
struct Cli {
    /// Email of the acting account
    #[arg(long, global = true)]
    email: Option<String>,
    /// Password of the acting account
    #[arg(long, global = true)]
    password: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CallOutcome {
    Verify,
    Reject,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Register demo accounts for each role
    Seed,
    /// Register accounts from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Create an account with the global email and password
    Signup {
        #[arg(long)]
        fullname: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, value_enum)]
        role: Role,
    },
    /// Check credentials and suspension status
    Login {
        #[arg(long, value_enum)]
        role: Role,
    },
    /// File a waste report as a citizen
    #[command(group(
        ArgGroup::new("manual")
            .args(["address", "city", "postal_code"])
            .multiple(true)
            .conflicts_with_all(["latitude", "longitude"])
    ))]
    Submit {
        #[arg(long, value_enum)]
        issue_type: Option<IssueType>,
        #[arg(long, default_value = "")]
        description: String,
        /// Photo as an encoded data URL
        #[arg(long)]
        photo: Option<String>,
        #[arg(long, requires = "longitude", allow_negative_numbers = true)]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude", allow_negative_numbers = true)]
        longitude: Option<f64>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        postal_code: Option<String>,
        /// Ask for a video call with a moderator
        #[arg(long)]
        instant_verification: bool,
    },
    /// Verify a pending report
    Verify {
        #[arg(long)]
        report: Uuid,
    },
    /// Show the number to call, or record the outcome of the call
    InstantVerify {
        #[arg(long)]
        report: Uuid,
        #[arg(long, value_enum)]
        outcome: Option<CallOutcome>,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Reject a pending report
    Reject {
        #[arg(long)]
        report: Uuid,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Reject a verified or in-progress report and revoke its task
    Refuse {
        #[arg(long)]
        report: Uuid,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        confirm: bool,
    },
    /// Override a report status
    SetStatus {
        #[arg(long)]
        report: Uuid,
        #[arg(long, value_enum)]
        status: ReportStatus,
    },
    /// Assign a volunteer to a verified report
    Assign {
        #[arg(long)]
        report: Uuid,
        /// Volunteer email
        #[arg(long)]
        volunteer: String,
    },
    /// Start an assigned task
    StartTask {
        #[arg(long)]
        task: Uuid,
    },
    /// Complete a started task with a proof photo
    CompleteTask {
        #[arg(long)]
        task: Uuid,
        #[arg(long)]
        photo: Option<String>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Review a volunteer's completed task
    RateVolunteer {
        #[arg(long)]
        task: Uuid,
        #[arg(long, value_enum)]
        report_type: Option<PerformanceReportType>,
        #[arg(long)]
        rating: u8,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "")]
        evidence: String,
        #[arg(long)]
        confirm: bool,
    },
    /// Show a volunteer's performance summary and history
    Performance {
        /// Volunteer email
        #[arg(long)]
        volunteer: String,
    },
    /// Suspend a citizen; zero days is permanent
    Suspend {
        #[arg(long)]
        citizen: String,
        #[arg(long)]
        days: u32,
        #[arg(long)]
        reason: String,
    },
    /// Extend a current suspension
    ExtendSuspension {
        #[arg(long)]
        citizen: String,
        #[arg(long)]
        days: u32,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Lift a suspension
    LiftSuspension {
        #[arg(long)]
        citizen: String,
    },
    /// List reports: a citizen's own, or the moderation queue
    Reports {
        #[arg(long, value_enum, default_value = "moderator")]
        role: Role,
        #[arg(long, value_enum)]
        status: Option<ReportStatus>,
        #[arg(long, value_enum)]
        issue_type: Option<IssueType>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List the signed-in volunteer's tasks
    Tasks {
        #[arg(long, value_enum)]
        status: Option<TaskStatus>,
        #[arg(long, value_enum)]
        issue_type: Option<IssueType>,
    },
    /// List accounts with their moderation flags
    Users {
        #[arg(long, value_enum)]
        role: Option<Role>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Update name and phone
    UpdateProfile {
        #[arg(long, value_enum)]
        role: Role,
        #[arg(long)]
        fullname: String,
        #[arg(long, default_value = "")]
        phone: String,
    },
    /// Change the password of the acting account
    ChangePassword {
        #[arg(long, value_enum)]
        role: Role,
        #[arg(long)]
        new_password: String,
    },
    /// Remove an account
    DeleteUser {
        #[arg(long)]
        user: String,
    },
    /// Write a markdown digest for moderators
    Digest {
        #[arg(long, default_value = "digest.md")]
        out: PathBuf,
    },
}

struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    fn from_args(email: Option<String>, password: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            email: email.context("--email is required for this command")?,
            password: password.context("--password is required for this command")?,
        })
    }
}

/// Signs in, runs the operation, prints the notices, and surfaces a failure
/// as the command's error.
async fn act<T>(
    pool: &PgPool,
    policy: Policy,
    credentials: &Credentials,
    role: Role,
    op: impl FnOnce(&mut Context<MemoryStore>) -> error::Result<T>,
) -> anyhow::Result<T> {
    let outcome = db::run(pool, policy, |ctx| {
        suspension::login(ctx, &credentials.email, &credentials.password, role)?;
        op(ctx)
    })
    .await?;

    if let Err(err) = &outcome.result {
        if err.is_authentication_failure() {
            tracing::warn!(email = %credentials.email, %role, error = %err, "Request refused");
        }
    }
    for notice in outcome.notices.iter() {
        match notice.kind {
            NoticeKind::Success => println!("{}", notice.message),
            NoticeKind::Warning => println!("Warning: {}", notice.message),
            NoticeKind::Failure => {}
        }
    }
    Ok(outcome.result?)
}

fn location_from_args(
    latitude: Option<f64>,
    longitude: Option<f64>,
    address: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
) -> Option<Location> {
    if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
        return Some(Location::Coordinates {
            latitude,
            longitude,
        });
    }
    if address.is_none() && city.is_none() && postal_code.is_none() {
        return None;
    }
    Some(Location::Manual {
        address: address.unwrap_or_default(),
        city: city.unwrap_or_default(),
        postal_code: postal_code.unwrap_or_default(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("waste_reporting=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        email,
        password,
        command,
    } = Cli::parse();
    let config = Config::from_env()?;
    let policy = config.policy();

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&pool, policy).await?;
            println!("Seeded {inserted} demo accounts.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, policy, &csv).await?;
            println!("Registered {inserted} accounts from {}.", csv.display());
        }
        Commands::Signup {
            fullname,
            phone,
            role,
        } => {
            let credentials = Credentials::from_args(email, password)?;
            let outcome = db::run(&pool, policy, |ctx| {
                users::add_user(
                    ctx,
                    NewUser {
                        fullname,
                        email: credentials.email.clone(),
                        password: credentials.password.clone(),
                        phone,
                        role,
                    },
                )
            })
            .await?;
            let user = outcome.result?;
            println!("Account {} created as {}.", user.email, user.role);
        }
        Commands::Login { role } => {
            let credentials = Credentials::from_args(email, password)?;
            let user = act(&pool, policy, &credentials, role, |ctx| {
                Ok(ctx.session().cloned())
            })
            .await?;
            if let Some(user) = user {
                println!("Signed in as {} ({}).", user.fullname, user.role);
            }
        }
        Commands::Submit {
            issue_type,
            description,
            photo,
            latitude,
            longitude,
            address,
            city,
            postal_code,
            instant_verification,
        } => {
            let credentials = Credentials::from_args(email, password)?;
            let input = NewReport {
                issue_type,
                description,
                photo,
                location: location_from_args(latitude, longitude, address, city, postal_code),
                instant_verification,
            };
            let report = act(&pool, policy, &credentials, Role::Citizen, |ctx| {
                reports::submit(ctx, input)
            })
            .await?;
            println!("Report {} filed ({}).", report.id, report.status);
        }
        Commands::Verify { report } => {
            let credentials = Credentials::from_args(email, password)?;
            act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                reports::verify(ctx, report)
            })
            .await?;
        }
        Commands::InstantVerify {
            report,
            outcome,
            reason,
        } => {
            let credentials = Credentials::from_args(email, password)?;
            match outcome {
                None => {
                    let number = act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                        reports::instant_verification_contact(ctx, report)
                    })
                    .await?;
                    println!("Call the citizen at +{number}, then record the outcome.");
                }
                Some(outcome) => {
                    let outcome = match outcome {
                        CallOutcome::Verify => InstantOutcome::Verify,
                        CallOutcome::Reject => InstantOutcome::Reject { reason },
                    };
                    act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                        reports::instant_verify(ctx, report, outcome)
                    })
                    .await?;
                }
            }
        }
        Commands::Reject { report, reason } => {
            let credentials = Credentials::from_args(email, password)?;
            act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                reports::reject(ctx, report, reason.as_deref())
            })
            .await?;
        }
        Commands::Refuse {
            report,
            reason,
            confirm,
        } => {
            let credentials = Credentials::from_args(email, password)?;
            act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                reports::refuse(ctx, report, &reason, confirm)
            })
            .await?;
        }
        Commands::SetStatus { report, status } => {
            let credentials = Credentials::from_args(email, password)?;
            act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                reports::override_status(ctx, report, status)
            })
            .await?;
        }
        Commands::Assign { report, volunteer } => {
            let credentials = Credentials::from_args(email, password)?;
            let (_, task) = act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                tasks::assign(ctx, report, &volunteer)
            })
            .await?;
            println!("Task {} is {}.", task.id, task.status);
        }
        Commands::StartTask { task } => {
            let credentials = Credentials::from_args(email, password)?;
            act(&pool, policy, &credentials, Role::Volunteer, |ctx| {
                tasks::start_task(ctx, task)
            })
            .await?;
        }
        Commands::CompleteTask { task, photo, notes } => {
            let credentials = Credentials::from_args(email, password)?;
            let (_, report) = act(&pool, policy, &credentials, Role::Volunteer, |ctx| {
                tasks::complete_task(ctx, task, photo, &notes)
            })
            .await?;
            println!("Report {} is {}.", report.id, report.status);
        }
        Commands::RateVolunteer {
            task,
            report_type,
            rating,
            description,
            evidence,
            confirm,
        } => {
            let credentials = Credentials::from_args(email, password)?;
            let input = NewPerformanceReport {
                task_id: task,
                report_type,
                performance_rating: rating,
                description,
                evidence_notes: evidence,
                confirmed: confirm,
            };
            let (record, summary) = act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                performance::record_performance_report(ctx, input)
            })
            .await?;
            println!(
                "{}: {} reports, avg rating {:.1}, warning {}",
                record.volunteer_name,
                summary.total_reports,
                summary.average_rating,
                summary.warning_level
            );
        }
        Commands::Performance { volunteer } => {
            let credentials = Credentials::from_args(email, password)?;
            let (summary, history) = act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                let user = ctx
                    .store
                    .find_user(&volunteer)?
                    .filter(|user| user.role == Role::Volunteer)
                    .ok_or_else(|| error::AppError::NotFound(format!("volunteer {volunteer}")))?;
                Ok((
                    performance::performance_summary(ctx, user.id)?,
                    performance::performance_history(ctx, user.id)?,
                ))
            })
            .await?;

            let Some(summary) = summary else {
                println!("No performance reports for {volunteer}.");
                return Ok(());
            };
            println!(
                "{} reports ({} positive, {} negative), avg rating {:.1}, warning {}",
                summary.total_reports,
                summary.positive_reports,
                summary.negative_reports,
                summary.average_rating,
                summary.warning_level
            );
            for record in history.iter() {
                println!(
                    "- {} {} rated {}/5 by {}: {}",
                    record.created_at.format("%Y-%m-%d"),
                    record.report_type.label(),
                    record.performance_rating,
                    record.moderator_name,
                    record.description
                );
            }
        }
        Commands::Suspend {
            citizen,
            days,
            reason,
        } => {
            let credentials = Credentials::from_args(email, password)?;
            act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                suspension::suspend(ctx, &citizen, days, &reason)
            })
            .await?;
        }
        Commands::ExtendSuspension {
            citizen,
            days,
            reason,
        } => {
            let credentials = Credentials::from_args(email, password)?;
            act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                suspension::extend(ctx, &citizen, days, reason.as_deref())
            })
            .await?;
        }
        Commands::LiftSuspension { citizen } => {
            let credentials = Credentials::from_args(email, password)?;
            act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                suspension::lift(ctx, &citizen)
            })
            .await?;
        }
        Commands::Reports {
            role,
            status,
            issue_type,
            search,
            limit,
        } => {
            let credentials = Credentials::from_args(email, password)?;
            let filter = ReportFilter {
                status,
                issue_type,
                search,
            };
            let (listed, stats) = act(&pool, policy, &credentials, role, |ctx| {
                let user = ctx.require_role(role)?;
                let listed: Vec<Report> = match role {
                    Role::Citizen => reports::reports_for_citizen(ctx, user.id)?
                        .into_iter()
                        .filter(|report| filter.matches(report))
                        .collect(),
                    Role::Moderator => reports::filter_reports(ctx, &filter)?,
                    Role::Volunteer => {
                        return Err(error::AppError::Unauthorized(
                            "citizen or moderator".to_string(),
                        ))
                    }
                };
                let stats = reports::dashboard_stats(ctx, &listed)?;
                Ok((listed, stats))
            })
            .await?;

            println!(
                "{} reports ({} pending, {} resolved)",
                stats.total_reports, stats.pending_reports, stats.resolved_reports
            );
            for report in listed.iter().take(limit) {
                let flag = if report.awaits_instant_verification() {
                    " [instant verification requested]"
                } else {
                    ""
                };
                println!(
                    "- {} {} ({}) by {} at {}{}",
                    report.id,
                    report.issue_type.label(),
                    report.status,
                    report.user_name,
                    report.location,
                    flag
                );
            }
        }
        Commands::Tasks { status, issue_type } => {
            let credentials = Credentials::from_args(email, password)?;
            let filter = TaskFilter { status, issue_type };
            let (listed, stats) = act(&pool, policy, &credentials, Role::Volunteer, |ctx| {
                let volunteer = ctx.require_role(Role::Volunteer)?;
                let stats = tasks::task_stats(&tasks::tasks_for_volunteer(ctx, volunteer.id)?);
                let listed = tasks::filter_tasks(ctx, volunteer.id, &filter)?;
                Ok((listed, stats))
            })
            .await?;

            println!(
                "{} tasks ({} active, {} completed)",
                stats.total_tasks, stats.active_tasks, stats.completed_tasks
            );
            for (task, report) in listed.iter() {
                println!(
                    "- {} [{}] {} at {}",
                    task.id,
                    task.status,
                    report.issue_type.label(),
                    report.location
                );
            }
        }
        Commands::Users { role, search } => {
            let credentials = Credentials::from_args(email, password)?;
            let filter = UserFilter { role, search };
            let listed = act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                users::user_listings(ctx, &filter)
            })
            .await?;

            println!("{} accounts", listed.len());
            for listing in listed.iter() {
                let user = &listing.user;
                let mut flags = Vec::new();
                if user.is_suspended {
                    flags.push("[suspended]".to_string());
                }
                if listing.action_required {
                    flags.push("[action required]".to_string());
                }
                if user.role == Role::Citizen && user.rejection_count > 0 {
                    flags.push(format!("{} rejections", user.rejection_count));
                }
                if let Some(summary) = &listing.performance {
                    flags.push(format!(
                        "avg rating {:.1}/5 over {} reports",
                        summary.average_rating, summary.total_reports
                    ));
                    if listing.performance_warning() {
                        flags.push(format!("[{} warning]", summary.warning_level));
                    }
                }
                println!(
                    "- {} ({}) {} {}",
                    user.fullname,
                    user.email,
                    user.role,
                    flags.join(" ")
                );
            }
        }
        Commands::UpdateProfile {
            role,
            fullname,
            phone,
        } => {
            let credentials = Credentials::from_args(email, password)?;
            act(&pool, policy, &credentials, role, |ctx| {
                users::update_profile(ctx, &fullname, &phone)
            })
            .await?;
        }
        Commands::ChangePassword { role, new_password } => {
            let credentials = Credentials::from_args(email, password)?;
            let current = credentials.password.clone();
            act(&pool, policy, &credentials, role, |ctx| {
                users::change_password(ctx, &current, &new_password)
            })
            .await?;
        }
        Commands::DeleteUser { user } => {
            let credentials = Credentials::from_args(email, password)?;
            act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                users::delete_user(ctx, &user)
            })
            .await?;
        }
        Commands::Digest { out } => {
            let credentials = Credentials::from_args(email, password)?;
            let output = act(&pool, policy, &credentials, Role::Moderator, |ctx| {
                let all = ctx.store.reports()?;
                let collected = digest::collect(ctx, &all)?;
                Ok(digest::build_digest(&collected))
            })
            .await?;
            std::fs::write(&out, output)?;
            println!("Digest written to {}.", out.display());
        }
    }

    Ok(())
}
