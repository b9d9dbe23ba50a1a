//! vigiltak-gen - CLI tool for generating CoT test events
//!
//! Produces Cursor on Target events in XML or TAK Protocol V1 binary
//! framing, written to stdout, a file, or sent straight to a
//! `udp://`/`tcp://` destination. Batch mode walks a simulated patrol
//! path so consecutive events move like a unit on foot.

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::net::{TcpStream, UdpSocket};
use std::path::PathBuf;
use uuid::Uuid;
use vigiltak_core::{LinkScheme, LinkUrl};
use vigiltak_cot::{encode, CotEvent, Point, WireFormat};
use vigiltak_relay::PatrolPath;

/// Generate CoT events for exercising TAK servers and agents
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Latitude in decimal degrees
    #[arg(long, default_value = "-27.4698")]
    lat: f64,

    /// Longitude in decimal degrees
    #[arg(long, default_value = "153.0251")]
    lon: f64,

    /// Altitude in meters (height above ellipsoid)
    #[arg(long, default_value = "0.0")]
    alt: f64,

    /// Callsign for the entity
    #[arg(long)]
    callsign: Option<String>,

    /// Unique ID (auto-generated if not specified)
    #[arg(long)]
    uid: Option<String>,

    /// Affiliation part of the CoT type
    #[arg(long, value_enum, default_value = "friendly")]
    affiliation: Affiliation,

    /// Entity dimension part of the CoT type
    #[arg(long, value_enum, default_value = "ground")]
    entity: Entity,

    /// Speed in meters per second
    #[arg(long, default_value = "0.0")]
    speed: f64,

    /// Course in degrees (0-360)
    #[arg(long, default_value = "0.0")]
    course: f64,

    /// Stale time in minutes
    #[arg(long, default_value = "5")]
    stale: i64,

    /// Wire format
    #[arg(long, value_enum, default_value = "xml")]
    format: Format,

    /// Output file (stdout if not specified)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Send to a destination URL (udp://host:port or tcp://host:port)
    /// instead of writing output
    #[arg(long)]
    send: Option<String>,

    /// Number of events to generate
    #[arg(long, default_value = "1")]
    batch: usize,

    /// Interval between batch events in milliseconds
    #[arg(long, default_value = "1000")]
    interval: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Affiliation {
    Pending,
    Unknown,
    AssumedFriend,
    Friendly,
    Neutral,
    Suspect,
    Hostile,
}

impl Affiliation {
    fn code(&self) -> char {
        match self {
            Affiliation::Pending => 'p',
            Affiliation::Unknown => 'u',
            Affiliation::AssumedFriend => 'a',
            Affiliation::Friendly => 'f',
            Affiliation::Neutral => 'n',
            Affiliation::Suspect => 's',
            Affiliation::Hostile => 'h',
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Entity {
    Ground,
    Air,
    Sea,
}

impl Entity {
    fn cot_type(&self, affiliation: Affiliation) -> String {
        let aff = affiliation.code();
        match self {
            Entity::Ground => format!("a-{aff}-G-E-V"), // ground equipment vehicle
            Entity::Air => format!("a-{aff}-A-M-F"),    // air military fixed wing
            Entity::Sea => format!("a-{aff}-S-S-F"),    // surface ship
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Xml,
    Mesh,
    Stream,
}

impl Format {
    fn wire_format(&self) -> WireFormat {
        match self {
            Format::Xml => WireFormat::Xml,
            Format::Mesh => WireFormat::MeshBinary,
            Format::Stream => WireFormat::StreamBinary,
        }
    }
}

struct Generator {
    args: Args,
    path: PatrolPath,
}

impl Generator {
    fn new(args: Args) -> Self {
        let path = PatrolPath::new(args.lat, args.lon);
        Self { args, path }
    }

    fn generate_event(&mut self, index: usize) -> CotEvent {
        let uid = self.args.uid.clone().unwrap_or_else(|| {
            if self.args.batch > 1 {
                format!("vigiltak-gen-{}-{}", Uuid::new_v4(), index)
            } else {
                format!("vigiltak-gen-{}", Uuid::new_v4())
            }
        });
        let callsign = self.args.callsign.clone().unwrap_or_else(|| {
            if self.args.batch > 1 {
                format!("UNIT-{}", index + 1)
            } else {
                "UNIT-1".to_string()
            }
        });

        // The first event sits at the requested position; batch mode
        // walks the patrol path from there.
        let (lat, lon) = if index == 0 {
            (self.args.lat, self.args.lon)
        } else {
            self.path.advance()
        };

        let cot_type = self.args.entity.cot_type(self.args.affiliation);
        CotEvent::new(
            uid,
            cot_type,
            "m-g",
            Point::new(lat, lon, self.args.alt),
            Duration::minutes(self.args.stale),
        )
        .with_detail("contact.callsign", callsign)
        .with_detail("track.speed", self.args.speed.to_string())
        .with_detail("track.course", self.args.course.to_string())
    }

    fn send(&self, url: &LinkUrl, data: &[u8]) -> Result<()> {
        match url.scheme {
            LinkScheme::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0").context("failed to bind UDP socket")?;
                socket
                    .send_to(data, url.addr())
                    .with_context(|| format!("failed to send to {url}"))?;
            }
            LinkScheme::Tcp => {
                let mut stream =
                    TcpStream::connect(url.addr()).with_context(|| format!("connect to {url}"))?;
                stream.write_all(data).context("failed to send TCP data")?;
            }
            LinkScheme::Tls => {
                anyhow::bail!("tls:// destinations are not supported here, use the agent");
            }
        }
        if self.args.verbose {
            eprintln!("Sent {} bytes to {}", data.len(), url);
        }
        Ok(())
    }

    fn write_output(&self, data: &[u8]) -> Result<()> {
        if let Some(output) = &self.args.output {
            std::fs::write(output, data)
                .with_context(|| format!("failed to write {}", output.display()))?;
            if self.args.verbose {
                eprintln!("Wrote {} bytes to {}", data.len(), output.display());
            }
        } else {
            std::io::stdout()
                .write_all(data)
                .context("failed to write to stdout")?;
        }
        Ok(())
    }

    fn run(&mut self) -> Result<()> {
        let destination = self
            .args
            .send
            .as_deref()
            .map(LinkUrl::parse)
            .transpose()
            .context("invalid destination URL")?;

        for i in 0..self.args.batch {
            let event = self.generate_event(i);
            if self.args.verbose {
                eprintln!("Generated event {}/{}", i + 1, self.args.batch);
                eprintln!("  UID:  {}", event.uid);
                eprintln!("  Type: {}", event.event_type);
                eprintln!(
                    "  Position: {}, {}, {}",
                    event.point.lat, event.point.lon, event.point.hae
                );
            }

            let mut data = encode(&event, self.args.format.wire_format())
                .context("failed to encode event")?;
            if matches!(self.args.format, Format::Xml) {
                data.push(b'\n');
            }

            match &destination {
                Some(url) => self.send(url, &data)?,
                None => self.write_output(&data)?,
            }

            if i + 1 < self.args.batch {
                std::thread::sleep(std::time::Duration::from_millis(self.args.interval));
            }
        }

        if let Some(url) = &destination {
            eprintln!("Sent {} event(s) to {}", self.args.batch, url);
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if !(-90.0..=90.0).contains(&args.lat) {
        anyhow::bail!("latitude must be between -90 and 90");
    }
    if !(-180.0..=180.0).contains(&args.lon) {
        anyhow::bail!("longitude must be between -180 and 180");
    }
    if !(0.0..=360.0).contains(&args.course) {
        anyhow::bail!("course must be between 0 and 360");
    }

    let mut generator = Generator::new(args);
    generator.run()
}
