use std::collections::HashMap;
use std::env;
use std::io::Write;
use std::path::PathBuf;

use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use bedflow::access::InMemoryPatients;
use bedflow::csv::{
    read_beds, read_commands, read_patients, read_rates, read_rooms, read_wards, write_census,
    write_charge_summaries,
};
use bedflow::model::AdmissionStatus;
use bedflow::{Actor, AllowAll, Engine, SystemClock};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let dir = PathBuf::from(env::args().nth(1).expect("usage: bedflow <fixture-dir>"));

    let mut patients = InMemoryPatients::new();
    for result in read_patients(dir.join("patients.csv")) {
        match result {
            Ok(patient) => patients.insert(patient),
            Err(e) => warn!("{e}"),
        }
    }

    let mut engine = Engine::with_ports(
        Box::new(SystemClock),
        Box::new(AllowAll),
        Box::new(patients),
    );
    let seeder = Actor::new("seed");

    for result in read_wards(dir.join("wards.csv")) {
        match result {
            Ok(new) => {
                if let Err(e) = engine.create_ward(&seeder, new) {
                    warn!("ward seed rejected: {e}");
                }
            }
            Err(e) => warn!("{e}"),
        }
    }
    for result in read_rooms(dir.join("rooms.csv")) {
        match result {
            Ok(new) => {
                if let Err(e) = engine.create_room(&seeder, new) {
                    warn!("room seed rejected: {e}");
                }
            }
            Err(e) => warn!("{e}"),
        }
    }
    for result in read_beds(dir.join("beds.csv")) {
        match result {
            Ok(new) => {
                if let Err(e) = engine.create_bed(&seeder, new) {
                    warn!("bed seed rejected: {e}");
                }
            }
            Err(e) => warn!("{e}"),
        }
    }
    for result in read_rates(dir.join("rates.csv")) {
        match result {
            Ok(new) => {
                if let Err(e) = engine.create_bed_rate(&seeder, new) {
                    warn!("rate seed rejected: {e}");
                }
            }
            Err(e) => warn!("{e}"),
        }
    }

    let commands_path = dir.join("commands.csv");
    let (tx_sender, tx_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in read_commands(&commands_path) {
            match result {
                Ok(command) => {
                    tx_sender.send(command).await.unwrap();
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    engine.run(ReceiverStream::new(tx_receiver)).await;

    // bed census, then per-admission charge summaries
    let rooms: HashMap<_, _> = engine
        .list_rooms(None)
        .into_iter()
        .map(|r| (r.id, r))
        .collect();
    let wards: HashMap<_, _> = engine
        .list_wards()
        .into_iter()
        .map(|w| (w.id, w))
        .collect();
    let occupants: HashMap<_, _> = engine
        .list_admissions(Some(AdmissionStatus::Admitted), None)
        .into_iter()
        .map(|a| (a.current_bed_id, (a.id, a.patient_id)))
        .collect();

    let census_rows: Vec<_> = engine
        .list_beds(None, None)
        .into_iter()
        .map(|bed| {
            let room = rooms.get(&bed.room_id);
            let ward = room.and_then(|r| wards.get(&r.ward_id));
            let occupant = occupants.get(&bed.id);
            (
                bed.id,
                room.map(|r| r.number.clone()).unwrap_or_default(),
                ward.map(|w| w.code.clone()).unwrap_or_default(),
                bed.state,
                occupant.map(|(admission, _)| *admission),
                occupant.map(|(_, patient)| *patient),
            )
        })
        .collect();

    let stdout = std::io::stdout();
    write_census(stdout.lock(), census_rows);

    let charge_rows: Vec<_> = engine
        .list_admissions(None, None)
        .into_iter()
        .filter_map(|a| {
            let preview = engine.preview_bed_charges(a.id, None, None).ok()?;
            Some((
                a.id,
                a.patient_id,
                preview.days.len(),
                preview.total_amount,
                preview.missing_rate_days,
            ))
        })
        .collect();

    writeln!(stdout.lock()).expect("failed to write separator");
    write_charge_summaries(stdout.lock(), charge_rows);
}
