//! Orchestrating verdict checks against a live server.
//!
//! For every declared zone the harness computes the expected verdict from
//! the key model, waits for the zone to become servable where that is
//! expected to happen, issues a live query, and compares the observed
//! status with the prediction. A mismatch is recorded and the remaining
//! zones are still checked, so one broken scenario does not hide the
//! results of the others.
//!
//! The server process itself and the zone files on disk are managed by
//! collaborators behind the [`ServerUnderTest`] and [`ZoneMaterializer`]
//! traits; the harness only talks to the server over the wire.

use std::fmt;
use std::io;
use std::path::PathBuf;

use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

use crate::client::{DefMinMax, DgramClient, QueryError};
use crate::keyset::ZoneKeySet;
use crate::policy::{evaluate, Verdict};
use crate::probe::{BoundaryProbe, LivenessFailure};
use crate::scenario::ZoneCase;
use crate::wire::{Qtype, Rcode};

//------------ Configuration Constants ---------------------------------------

/// Configuration limits for the servable wait.
const SERVABLE_TIMEOUT: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(10),
    Duration::from_millis(100),
    Duration::from_secs(300),
);

/// Configuration limits for the servable poll interval.
const POLL_INTERVAL: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_millis(500),
    Duration::from_millis(10),
    Duration::from_secs(10),
);

/// Configuration limits for the per query timeout.
const QUERY_TIMEOUT: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(5),
    Duration::from_millis(1),
    Duration::from_secs(60),
);

/// Configuration limits for the per query try budget.
const QUERY_TRIES: DefMinMax<u8> = DefMinMax::new(3, 1, 100);

//------------ CheckConfig ---------------------------------------------------

/// Configuration for the per-zone checks.
#[derive(Clone, Debug)]
pub struct CheckConfig {
    /// How long to wait for a zone to become servable.
    servable_timeout: Duration,

    /// How long to pause between servable polls.
    poll_interval: Duration,

    /// Read timeout of the verdict query.
    query_timeout: Duration,

    /// Try budget of the verdict query.
    query_tries: u8,
}

impl CheckConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the servable wait timeout.
    pub fn servable_timeout(&self) -> Duration {
        self.servable_timeout
    }

    /// Sets the servable wait timeout.
    ///
    /// If this value is too small or too large, it will be capped.
    pub fn set_servable_timeout(&mut self, value: Duration) {
        self.servable_timeout = SERVABLE_TIMEOUT.limit(value)
    }

    /// Returns the pause between servable polls.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Sets the pause between servable polls.
    ///
    /// If this value is too small or too large, it will be capped.
    pub fn set_poll_interval(&mut self, value: Duration) {
        self.poll_interval = POLL_INTERVAL.limit(value)
    }

    /// Returns the read timeout of the verdict query.
    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Sets the read timeout of the verdict query.
    ///
    /// If this value is too small or too large, it will be capped.
    pub fn set_query_timeout(&mut self, value: Duration) {
        self.query_timeout = QUERY_TIMEOUT.limit(value)
    }

    /// Returns the try budget of the verdict query.
    pub fn query_tries(&self) -> u8 {
        self.query_tries
    }

    /// Sets the try budget of the verdict query.
    ///
    /// If this value is too small or too large, it will be capped.
    pub fn set_query_tries(&mut self, value: u8) {
        self.query_tries = QUERY_TRIES.limit(value)
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            servable_timeout: SERVABLE_TIMEOUT.default(),
            poll_interval: POLL_INTERVAL.default(),
            query_timeout: QUERY_TIMEOUT.default(),
            query_tries: QUERY_TRIES.default(),
        }
    }
}

//------------ Collaborator Traits -------------------------------------------

/// The lifecycle of the name server under test.
///
/// Implementations manage the actual server process; the harness never
/// spawns or signals processes itself.
pub trait ServerUnderTest {
    /// Starts the server.
    fn start(&mut self) -> Result<(), io::Error>;

    /// Stops the server.
    fn stop(&mut self) -> Result<(), io::Error>;

    /// Makes the server reload its configuration and zones.
    fn reload(&mut self) -> Result<(), io::Error>;

    /// Returns whether the server process is running.
    fn is_alive(&self) -> bool;
}

/// Options for generating a zone file.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZoneFileOpts {
    /// Whether to sign the generated zone.
    pub dnssec: bool,

    /// Whether to use hashed denial of existence.
    pub nsec3: bool,
}

/// Materializing zones on disk.
pub trait ZoneMaterializer {
    /// Generates a zone file for the zone and returns its path.
    fn generate_zone_file(
        &self,
        set: &ZoneKeySet,
        record_count: usize,
        opts: ZoneFileOpts,
    ) -> Result<PathBuf, io::Error>;
}

/// Generates zone files for a whole set of test cases.
///
/// Returns the generated paths in table order.
pub fn provision_zones<M: ZoneMaterializer>(
    materializer: &M,
    cases: &[ZoneCase],
    opts: ZoneFileOpts,
) -> Result<Vec<PathBuf>, io::Error> {
    cases
        .iter()
        .map(|case| {
            materializer.generate_zone_file(&case.set, case.records, opts)
        })
        .collect()
}

//------------ ZoneReport ----------------------------------------------------

/// The result of checking one zone.
#[derive(Debug)]
pub struct ZoneReport {
    /// The name of the zone.
    zone: String,

    /// The predicted verdict.
    expected: Verdict,

    /// What the live server did.
    outcome: Result<Verdict, CheckError>,
}

impl ZoneReport {
    /// Returns the name of the zone.
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Returns the predicted verdict.
    pub fn expected(&self) -> Verdict {
        self.expected
    }

    /// Returns the observed verdict or the error that got in the way.
    pub fn outcome(&self) -> Result<Verdict, &CheckError> {
        self.outcome.as_ref().copied()
    }

    /// Returns whether the live server matched the prediction.
    pub fn matched(&self) -> bool {
        matches!(self.outcome, Ok(observed) if observed == self.expected)
    }
}

impl fmt::Display for ZoneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Ok(observed) if *observed == self.expected => {
                write!(f, "{}: {} as predicted", self.zone, observed)
            }
            Ok(observed) => write!(
                f,
                "{}: predicted {}, server said {}",
                self.zone, self.expected, observed
            ),
            Err(err) => {
                write!(f, "{}: {}", self.zone, err)
            }
        }
    }
}

//------------ Report --------------------------------------------------------

/// The aggregated results of a run.
#[derive(Debug, Default)]
pub struct Report {
    /// The per-zone results in the order they were checked.
    zones: Vec<ZoneReport>,
}

impl Report {
    /// Returns whether every zone matched its prediction.
    pub fn passed(&self) -> bool {
        self.zones.iter().all(ZoneReport::matched)
    }

    /// Returns the per-zone results.
    pub fn zones(&self) -> &[ZoneReport] {
        &self.zones
    }

    /// Returns the zones that did not match their prediction.
    pub fn failures(&self) -> impl Iterator<Item = &ZoneReport> {
        self.zones.iter().filter(|report| !report.matched())
    }
}

//------------ check_zone ----------------------------------------------------

/// Checks one zone against its prediction.
///
/// For a zone predicted valid, the check first waits for the zone to
/// become servable, polling with a bounded budget; a zone predicted
/// invalid never becomes servable, so it is queried directly. The live
/// status maps success to [`Verdict::Valid`] and server failure to
/// [`Verdict::Invalid`]; any other status is an error, never coerced
/// into either verdict.
pub async fn check_zone(
    client: &DgramClient,
    set: &ZoneKeySet,
    config: &CheckConfig,
) -> ZoneReport {
    let expected = evaluate(set);
    debug!("{}: predicted {}", set.name(), expected);

    if expected.is_valid() {
        if let Err(err) = wait_servable(client, set.name(), config).await {
            warn!("{}: {}", set.name(), err);
            return ZoneReport {
                zone: set.name().into(),
                expected,
                outcome: Err(err),
            };
        }
    }

    let outcome = match client
        .query_with(
            set.name(),
            Qtype::SOA,
            config.query_timeout,
            config.query_tries,
        )
        .await
    {
        Ok(response) => match response.rcode() {
            Rcode::NOERROR => Ok(Verdict::Valid),
            Rcode::SERVFAIL => Ok(Verdict::Invalid),
            other => Err(CheckError::UnexpectedStatus(other)),
        },
        Err(err) => Err(CheckError::Query(err)),
    };

    let report = ZoneReport {
        zone: set.name().into(),
        expected,
        outcome,
    };
    if report.matched() {
        debug!("{}", report);
    } else {
        warn!("{}", report);
    }
    report
}

/// Checks every zone and aggregates the results.
///
/// A mismatch or per-zone error never stops the remaining checks.
pub async fn check_zones(
    client: &DgramClient,
    sets: &[ZoneKeySet],
    config: &CheckConfig,
) -> Report {
    let mut report = Report::default();
    for set in sets {
        report.zones.push(check_zone(client, set, config).await);
    }
    report
}

/// Waits for a zone to answer with success status.
///
/// Polls with single-try queries until the deadline passes. Exceeding
/// the deadline is an error for the zone, not a silent skip.
async fn wait_servable(
    client: &DgramClient,
    zone: &str,
    config: &CheckConfig,
) -> Result<(), CheckError> {
    let deadline = Instant::now() + config.servable_timeout;
    loop {
        if let Ok(response) = client
            .query_with(zone, Qtype::SOA, config.poll_interval, 1)
            .await
        {
            if response.rcode() == Rcode::NOERROR {
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            return Err(CheckError::ServableTimeout {
                waited: config.servable_timeout,
            });
        }
        sleep(config.poll_interval).await;
    }
}

//------------ run_suite -----------------------------------------------------

/// Runs a complete conformance pass.
///
/// Zone files are generated for every case, the server is started, or
/// reloaded if it is already running, every zone is checked against its
/// prediction, and finally the framing boundary is probed with a
/// liveness check against the first zone predicted valid. The server is
/// stopped afterwards.
///
/// Collaborator failures and a lost server are errors of the run itself;
/// verdict mismatches are ordinary results and end up in the report.
pub async fn run_suite<S, M>(
    server: &mut S,
    materializer: &M,
    client: &DgramClient,
    cases: &[ZoneCase],
    opts: ZoneFileOpts,
    config: &CheckConfig,
) -> Result<Report, SuiteError>
where
    S: ServerUnderTest,
    M: ZoneMaterializer,
{
    provision_zones(materializer, cases, opts)
        .map_err(SuiteError::Server)?;
    if server.is_alive() {
        server.reload().map_err(SuiteError::Server)?;
    } else {
        server.start().map_err(SuiteError::Server)?;
    }

    let sets: Vec<_> =
        cases.iter().map(|case| case.set.clone()).collect();
    let report = check_zones(client, &sets, config).await;

    if let Some(set) = sets.iter().find(|set| evaluate(set).is_valid()) {
        let probe = BoundaryProbe::new(client.clone());
        probe.run().await.map_err(SuiteError::Probe)?;
        probe
            .check_alive(
                set.name(),
                config.query_timeout,
                config.query_tries,
            )
            .await
            .map_err(SuiteError::Liveness)?;
    }

    if !server.is_alive() {
        return Err(SuiteError::ServerDied);
    }
    server.stop().map_err(SuiteError::Server)?;
    Ok(report)
}

//------------ SuiteError ----------------------------------------------------

/// A conformance pass could not run to completion.
#[derive(Debug)]
pub enum SuiteError {
    /// A collaborator failed to manage the server or the zone files.
    Server(io::Error),

    /// The boundary probes could not be transmitted.
    Probe(QueryError),

    /// The server did not prove liveness after probing.
    Liveness(LivenessFailure),

    /// The server process was gone at the end of the run.
    ServerDied,
}

impl fmt::Display for SuiteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuiteError::Server(err) => {
                write!(f, "managing the server under test failed: {}", err)
            }
            SuiteError::Probe(err) => {
                write!(f, "transmitting boundary probes failed: {}", err)
            }
            SuiteError::Liveness(err) => err.fmt(f),
            SuiteError::ServerDied => {
                write!(f, "server process gone after the run")
            }
        }
    }
}

impl std::error::Error for SuiteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SuiteError::Server(err) => Some(err),
            SuiteError::Probe(err) => Some(err),
            SuiteError::Liveness(err) => Some(err),
            SuiteError::ServerDied => None,
        }
    }
}

//------------ CheckError ----------------------------------------------------

/// A zone check could not produce an observed verdict.
#[derive(Debug)]
pub enum CheckError {
    /// The zone did not become servable within the wait budget.
    ServableTimeout {
        /// How long the check waited.
        waited: Duration,
    },

    /// The verdict query failed.
    Query(QueryError),

    /// The live status was neither success nor server failure.
    UnexpectedStatus(Rcode),
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckError::ServableTimeout { waited } => {
                write!(
                    f,
                    "zone not servable after {:.1}s",
                    waited.as_secs_f64()
                )
            }
            CheckError::Query(err) => {
                write!(f, "verdict query failed: {}", err)
            }
            CheckError::UnexpectedStatus(rcode) => {
                write!(f, "unexpected status {}", rcode)
            }
        }
    }
}

impl std::error::Error for CheckError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CheckError::Query(err) => Some(err),
            _ => None,
        }
    }
}

//============ Testing =======================================================
