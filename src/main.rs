// 🚚 Custodia CLI - traspasos de custodia desde chats de flota

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use rusqlite::Connection;
use std::env;
use std::path::Path;

use custodia::{
    analyze_lines, check_processing, commit_batch, load_lines, records_for_date,
    sent_alerts_for_date, setup_ledger, write_starter_registry, AlertPolicy, AlertScheduler,
    BatchAnalysis, CommitOutcome, ConsoleNotifier, FileRegistry, ProcessingBatch,
    ProcessingContext, TickOutcome,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("analyze") => run_analyze(&args[2..])?,
        Some("commit") => run_commit(&args[2..])?,
        Some("check") => run_check(&args[2..])?,
        Some("tick") => run_tick(&args[2..])?,
        Some("watch") => run_watch(&args[2..])?,
        Some("init-registry") => run_init_registry(&args[2..])?,
        _ => print_usage(),
    }

    Ok(())
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_analyze(args: &[String]) -> Result<()> {
    let input = args
        .first()
        .filter(|arg| !arg.starts_with("--"))
        .context("Usage: custodia analyze <archivo> [--registry fleet.json]")?;
    let registry_path = flag_value(args, "--registry").unwrap_or_else(|| "fleet.json".to_string());

    println!("🚚 Custodia - análisis de traspasos");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let (lines, kind) = load_lines(input)?;
    println!("📂 {} líneas de {} ({})", lines.len(), input, kind.name());

    let registry = FileRegistry::new(&registry_path);
    let ctx = ProcessingContext::new(&registry);
    let analysis = analyze_lines(&ctx, &lines)?;

    println!(
        "🔍 Candidatos únicos: {} ({} duplicados descartados)",
        analysis.dedup.kept, analysis.dedup.dropped
    );
    println!(
        "✓ Traspasos válidos: {} de {}",
        analysis.valid_count(),
        analysis.transfers.len()
    );

    print_review(&analysis);

    Ok(())
}

fn run_commit(args: &[String]) -> Result<()> {
    let input = args.first().filter(|arg| !arg.starts_with("--")).context(
        "Usage: custodia commit <archivo> --date YYYY-MM-DD [--registry fleet.json] [--db custodia.db] [--force]",
    )?;
    let date_arg = flag_value(args, "--date").context("--date YYYY-MM-DD is required")?;
    let date = NaiveDate::parse_from_str(&date_arg, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {}", date_arg))?;
    let registry_path = flag_value(args, "--registry").unwrap_or_else(|| "fleet.json".to_string());
    let db_path = flag_value(args, "--db").unwrap_or_else(|| "custodia.db".to_string());
    let force = has_flag(args, "--force");

    let (lines, kind) = load_lines(input)?;
    let registry = FileRegistry::new(&registry_path);
    let ctx = ProcessingContext::new(&registry);
    let analysis = analyze_lines(&ctx, &lines)?;

    let label = Path::new(input)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(input)
        .to_string();
    let batch = ProcessingBatch::from_transfers(date, &analysis.transfers, vec![label], kind);

    let conn = Connection::open(&db_path)?;
    setup_ledger(&conn)?;

    match commit_batch(&conn, &batch, force)? {
        CommitOutcome::Recorded { record, report } => {
            if report.is_first_processing_of_day {
                println!(
                    "✅ Primer procesamiento del {}: {} traspasos",
                    date, record.transfers_processed
                );
            } else if report.has_changes {
                println!("✅ Reprocesado {} con cambios:", date);
                for change in &report.changes {
                    println!("   • {}", change);
                }
            } else {
                println!("✅ Reprocesado {} sin cambios (--force)", date);
            }
            println!("   Huella: {}", record.fingerprint);
        }
        CommitOutcome::SkippedUnchanged { .. } => {
            println!("⏭️  Sin cambios para {}: no se registró nada", date);
            println!("   Usa --force para registrar de todos modos");
        }
    }

    Ok(())
}

fn run_check(args: &[String]) -> Result<()> {
    let date_arg = args
        .first()
        .context("Usage: custodia check YYYY-MM-DD [--db custodia.db]")?;
    let date = NaiveDate::parse_from_str(date_arg, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {}", date_arg))?;
    let db_path = flag_value(args, "--db").unwrap_or_else(|| "custodia.db".to_string());

    let conn = Connection::open(&db_path)?;
    setup_ledger(&conn)?;

    let policy = AlertPolicy::new("operador");
    let today = Local::now().date_naive();
    let status = check_processing(&conn, date, today, &policy.alertable_weekdays)?;

    if let Some(record) = &status.last_record {
        println!(
            "✅ {} procesado: {} traspasos ({})",
            date,
            record.transfers_processed,
            record.source_kind.name()
        );
        println!("   Archivos: {}", record.file_labels.join(", "));
        println!("   Huella: {}", record.fingerprint);
        println!("   Registrado: {}", record.recorded_at.to_rfc3339());
    } else {
        println!("❌ {} sin procesar", date);
        if status.should_alert {
            println!("⚠️  Día operativo vencido: candidato a alerta");
        }
    }

    let history = records_for_date(&conn, date)?;
    if history.len() > 1 {
        println!("\n📜 Historial ({} registros):", history.len());
        for record in &history {
            println!(
                "   {} → {} traspasos",
                record.recorded_at.to_rfc3339(),
                record.transfers_processed
            );
        }
    }

    for alert in sent_alerts_for_date(&conn, date)? {
        println!(
            "🔔 Alerta {} enviada: {}",
            alert.alert_kind.code(),
            alert.sent_at.to_rfc3339()
        );
    }

    Ok(())
}

fn run_tick(args: &[String]) -> Result<()> {
    let db_path = flag_value(args, "--db").unwrap_or_else(|| "custodia.db".to_string());
    let days_back: i64 = match flag_value(args, "--days-back") {
        Some(value) => value
            .parse()
            .with_context(|| format!("Invalid --days-back: {}", value))?,
        None => 7,
    };
    let recipient = flag_value(args, "--recipient").unwrap_or_else(|| "operador".to_string());

    let conn = Connection::open(&db_path)?;
    setup_ledger(&conn)?;

    let scheduler = AlertScheduler::new(AlertPolicy::new(&recipient));
    let notifier = ConsoleNotifier::new();
    let now = Local::now().naive_local();

    for (date, outcome) in scheduler.tick_window(&conn, &notifier, now, days_back)? {
        match outcome {
            TickOutcome::AlertSent { record_persisted } => {
                if record_persisted {
                    println!("📨 {} alerta enviada", date);
                } else {
                    println!(
                        "📨 {} alerta enviada (registro pendiente, puede repetirse)",
                        date
                    );
                }
            }
            TickOutcome::SendFailed { error } => println!("❌ {} envío fallido: {}", date, error),
            TickOutcome::AlreadyProcessed => println!("✓ {} procesado", date),
            TickOutcome::AlreadyAlerted => println!("• {} ya alertado", date),
            TickOutcome::NotAlertable => println!("• {} día no operativo", date),
            TickOutcome::NotYetDue => println!("• {} aún no vence", date),
        }
    }

    Ok(())
}

fn run_watch(args: &[String]) -> Result<()> {
    let interval_mins: u64 = match flag_value(args, "--interval-mins") {
        Some(value) => value
            .parse()
            .with_context(|| format!("Invalid --interval-mins: {}", value))?,
        None => 30,
    };

    println!(
        "👁️  Custodia en modo vigilancia (cada {} min, Ctrl+C para salir)",
        interval_mins
    );

    loop {
        run_tick(args)?;
        std::thread::sleep(std::time::Duration::from_secs(interval_mins * 60));
    }
}

fn run_init_registry(args: &[String]) -> Result<()> {
    let path = args.first().map(|s| s.as_str()).unwrap_or("fleet.json");

    let snapshot = write_starter_registry(path)?;
    println!(
        "✅ Registro inicial en {}: {} vehículos, {} choferes",
        path,
        snapshot.vehicles.len(),
        snapshot.drivers.len()
    );
    println!("   Edita el archivo con tu flota real antes de procesar");

    Ok(())
}

// ============================================================================
// OUTPUT
// ============================================================================

fn print_review(analysis: &BatchAnalysis) {
    for transfer in &analysis.transfers {
        let marker = if transfer.is_valid { "✅" } else { "⚠️ " };
        println!(
            "\n{} línea {}: {}",
            marker, transfer.candidate.line_number, transfer.candidate.original_text
        );

        match &transfer.vehicle_match {
            Some(vehicle) => println!("   Vehículo: {}", vehicle.plate),
            None => {
                println!(
                    "   Vehículo sin resolver: {}",
                    transfer.candidate.vehicle_token
                );
                for suggestion in &transfer.suggestions.vehicle {
                    println!("      ¿{}? ({})", suggestion.plate, suggestion.id);
                }
            }
        }

        match &transfer.to_driver_match {
            Some(driver) => println!("   Recibe: {}", driver.name),
            None => {
                println!(
                    "   Chofer sin resolver: {}",
                    transfer.candidate.to_driver_token
                );
                for suggestion in &transfer.suggestions.to_driver {
                    println!("      ¿{}? ({})", suggestion.name, suggestion.id);
                }
            }
        }

        if let Some(from) = &transfer.from_driver_match {
            println!("   Entrega: {}", from.name);
        } else if let Some(token) = &transfer.candidate.from_driver_token {
            println!("   Entrega (sin resolver): {}", token);
        }

        println!(
            "   Confianza: {:.2} | regla {}",
            transfer.candidate.confidence, transfer.candidate.pattern_id
        );
    }
}

fn print_usage() {
    println!(
        "🚚 Custodia {} - traspasos de custodia desde chats de flota",
        custodia::VERSION
    );
    println!();
    println!("Comandos:");
    println!("  analyze <archivo> [--registry fleet.json]");
    println!("      Extrae y reconcilia traspasos sin tocar el ledger");
    println!("  commit <archivo> --date YYYY-MM-DD [--registry ...] [--db ...] [--force]");
    println!("      Registra el procesamiento del día (append-only)");
    println!("  check YYYY-MM-DD [--db ...]");
    println!("      Estado de procesamiento e historial de un día");
    println!("  tick [--db ...] [--days-back 7] [--recipient operador]");
    println!("      Un ciclo de alertas para días vencidos sin procesar");
    println!("  watch [--interval-mins 30] [opciones de tick]");
    println!("      Corre tick en bucle");
    println!("  init-registry [fleet.json]");
    println!("      Crea un registro de flota inicial para editar");
}

// ============================================================================
// FLAGS
// ============================================================================

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|idx| args.get(idx + 1))
        .cloned()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}
