//! ClinQ命令行程序

mod replay;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clinq_admin::{init_tracing, ConfigManager};
use clinq_workflow::{RawVitals, VitalsValidator};
use std::path::PathBuf;
use tracing::{error, info};

/// ClinQ命令行参数
#[derive(Parser, Debug)]
#[command(name = "clinq")]
#[command(about = "ClinQ 患者流转：分诊分类、候诊排序与病区收治")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 日志级别（覆盖配置文件）
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 对一组生命体征进行分诊分类
    Classify {
        #[arg(long)]
        temperature: String,
        #[arg(long)]
        pulse: String,
        #[arg(long)]
        systolic: String,
        #[arg(long)]
        diastolic: String,
        #[arg(long)]
        respiratory_rate: String,
        #[arg(long)]
        spo2: String,
    },

    /// 回放班次脚本并输出候诊队列、总览和审计记录
    Replay {
        /// JSON脚本路径
        script: PathBuf,

        /// 遇到失败步骤时停止
        #[arg(long)]
        stop_on_error: bool,

        /// 输出Prometheus指标
        #[arg(long)]
        metrics: bool,
    },

    /// 输出生效配置（TOML）
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let manager = ConfigManager::load(args.config.as_deref())?;
    let mut config = manager.get_config().await;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    // 初始化日志
    init_tracing(&config.logging)?;

    match args.command {
        Command::Classify {
            temperature,
            pulse,
            systolic,
            diastolic,
            respiratory_rate,
            spo2,
        } => {
            let raw = RawVitals::new(temperature, pulse, systolic, diastolic, respiratory_rate, spo2);
            let validator = VitalsValidator::new(config.validation.limits());

            for field_error in &validator.check(&raw).errors {
                eprintln!("invalid {}: {}", field_error.field, field_error.reason);
            }
            let vitals = validator.validate(&raw)?;
            let assessment = clinq_workflow::TriageClassifier::new().assess(&vitals);

            println!("{}", assessment.level);
            for finding in &assessment.findings {
                println!("  {}", finding);
            }
        }

        Command::Replay {
            script,
            stop_on_error,
            metrics,
        } => {
            let steps = replay::load_script(&script)?;
            let report = replay::run(&config, steps, stop_on_error).await?;
            print_report(&report, metrics)?;

            if report.failures() > 0 {
                error!("{} of {} steps failed", report.failures(), report.outcomes.len());
            } else {
                info!("Replay completed: {} steps", report.outcomes.len());
            }
        }

        Command::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn print_report(report: &replay::ReplayReport, with_metrics: bool) -> Result<()> {
    println!("== Steps");
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(patient) => println!(
                "{:>3} {:<9} ok    {} {}",
                outcome.index,
                outcome.action,
                patient.id,
                patient.status.as_str()
            ),
            Err(e) => println!("{:>3} {:<9} error {}", outcome.index, outcome.action, e),
        }
    }

    println!("\n== Priority queue");
    for (position, patient) in report.queue.iter().enumerate() {
        let urgency = patient
            .urgency()
            .map_or("UNTRIAGED", |level| level.as_str());
        println!(
            "{:>3} {} {:<11} {}",
            position + 1,
            patient.id,
            urgency,
            patient.name()
        );
    }

    let overview = &report.overview;
    println!("\n== Overview");
    println!("patients        {}", overview.total_patients);
    println!("waiting         {}", overview.queue_length);
    println!("critical waiting {}", overview.critical_waiting);
    println!(
        "beds            {}/{} ({:.0}%)",
        overview.occupied_beds,
        overview.total_beds,
        overview.occupancy_rate * 100.0
    );
    for ward in &overview.wards {
        println!("  {:<6} {}/{}  {}", ward.id, ward.occupied, ward.capacity, ward.name);
    }

    println!("\n== Audit trail");
    for entry in &report.audit {
        println!(
            "{} {:<10} {:<20} {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.actor_id,
            entry.action.as_str(),
            entry.detail
        );
    }

    if with_metrics {
        println!("\n== Metrics");
        print!("{}", report.metrics.render()?);
    }

    Ok(())
}
