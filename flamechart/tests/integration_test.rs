use chrome_trace_format::{load_from_reader, LoadOptions, LoaderClient, RawTrace};
use eyre::{eyre, Result};
use flamechart::config::Config;
use flamechart::entries_filter::FilterAction;
use flamechart::modifications::{Annotation, ModificationsManager};
use flamechart::network_provider::NetworkFlameChartDataProvider;
use flamechart::timeline_data::Decoration;
use flamechart::{FlameChartDataProvider, TraceData};
use rstest::{fixture, rstest};
use serde_json::json;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

struct TestSetup {
    _temp_dir: TempDir,
    trace_path: PathBuf,
    config_path: PathBuf,
    modifications_path: PathBuf,
}

impl TestSetup {
    fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let trace_path = temp_dir.path().join("trace.json");
        let config_path = temp_dir.path().join("config.toml");
        let modifications_path = temp_dir.path().join("modifications.json");

        let trace = json!({
            "traceEvents": [
                { "name": "thread_name", "cat": "__metadata", "ph": "M", "pid": 1, "tid": 1,
                  "args": { "name": "CrRendererMain" } },
                { "name": "RunTask", "cat": "toplevel", "ph": "X", "ts": 1000, "dur": 80000, "pid": 1, "tid": 1 },
                { "name": "FunctionCall", "cat": "devtools.timeline", "ph": "X", "ts": 2000, "dur": 30000,
                  "pid": 1, "tid": 1 },
                { "name": "TimerInstall", "cat": "devtools.timeline", "ph": "X", "ts": 3000, "dur": 10,
                  "pid": 1, "tid": 1, "args": { "data": { "timerId": 7 } } },
                { "name": "TimerFire", "cat": "devtools.timeline", "ph": "X", "ts": 90000, "dur": 5000,
                  "pid": 1, "tid": 1, "args": { "data": { "timerId": 7 } } },
                { "name": "ResourceSendRequest", "cat": "devtools.timeline", "ph": "I", "ts": 1500, "pid": 1,
                  "tid": 1, "s": "t",
                  "args": { "data": { "requestId": "1", "url": "https://example.com/", "priority": "High" } } },
                { "name": "ResourceFinish", "cat": "devtools.timeline", "ph": "I", "ts": 40000, "pid": 1,
                  "tid": 1, "s": "t", "args": { "data": { "requestId": "1" } } }
            ],
            "metadata": { "source": "DevTools" }
        });
        fs::write(&trace_path, serde_json::to_vec(&trace)?)?;
        fs::write(
            &config_path,
            r#"
[load]
chunk_size = 64

[layout]
long_task_threshold_ms = 100.0
"#,
        )?;

        Ok(TestSetup {
            _temp_dir: temp_dir,
            trace_path,
            config_path,
            modifications_path,
        })
    }

    fn load(&self, options: LoadOptions) -> Result<Arc<TraceData>> {
        let file = File::open(&self.trace_path)?;
        let (client, result) = load_from_reader(file, Collector::default(), options, None);
        result?;
        let raw = client.trace.ok_or_else(|| eyre!("no trace"))?;
        Ok(Arc::new(TraceData::build(&raw)))
    }
}

#[derive(Default)]
struct Collector {
    trace: Option<RawTrace>,
}

impl LoaderClient for Collector {
    fn loading_complete(&mut self, trace: Option<RawTrace>) {
        self.trace = trace;
    }
}

#[fixture]
fn setup() -> TestSetup {
    TestSetup::new().expect("failed to create test setup")
}

fn index_of(provider: &mut FlameChartDataProvider, trace: &TraceData, name: &str) -> usize {
    let id = trace
        .events()
        .iter()
        .find(|event| event.name == name)
        .map(|event| event.id)
        .expect("event present");
    provider.index_for_event(id).expect("event drawn")
}

#[rstest]
fn test_load_and_lay_out(setup: TestSetup) -> Result<()> {
    let trace = setup.load(LoadOptions {
        chunk_size: 17,
        ..LoadOptions::default()
    })?;
    assert_eq!(trace.network_requests.len(), 1);

    let mut provider = FlameChartDataProvider::new(Config::default().layout);
    provider.set_model(Some(trace.clone()));
    let names: Vec<String> = provider
        .timeline_data(false)
        .groups()
        .iter()
        .map(|group| group.name.clone())
        .collect();
    assert_eq!(names, vec!["Main".to_string()]);

    let run_task = index_of(&mut provider, &trace, "RunTask");
    let decorations = provider.decorate_entry(run_task).expect("event entry");
    assert!(decorations
        .iter()
        .any(|decoration| matches!(decoration, Decoration::WarningTriangle { .. })));

    let fire = index_of(&mut provider, &trace, "TimerFire");
    assert!(provider.build_flow_for_initiator(Some(fire))?);
    assert_eq!(provider.timeline_data(false).initiators().len(), 1);

    let mut network = NetworkFlameChartDataProvider::new();
    network.set_model(Some(trace));
    assert_eq!(network.timeline_data(false).len(), 1);
    assert_eq!(network.entry_title(0).as_deref(), Some("https://example.com/"));
    Ok(())
}

#[rstest]
fn test_modifications_survive_reload(setup: TestSetup) -> Result<()> {
    let trace = setup.load(LoadOptions::default())?;
    let mut provider = FlameChartDataProvider::new(Config::default().layout);
    provider.set_model(Some(trace.clone()));
    let before = provider.timeline_data(false).len();

    let run_task = index_of(&mut provider, &trace, "RunTask");
    assert!(provider.modify_tree(FilterAction::CollapseFunction, run_task)?);
    let collapsed = provider.timeline_data(false).len();
    assert_eq!(collapsed, before - 2);

    let fire = trace.events().iter().find(|event| event.name == "TimerFire").map(|event| event.id);
    let modifications = provider.modifications_mut().expect("model bound");
    modifications.add_annotation(Annotation::EntryLabel {
        entry: fire.expect("timer fire"),
        label: "slow timer".to_string(),
    });
    fs::write(&setup.modifications_path, modifications.to_json()?)?;

    let reloaded = setup.load(LoadOptions::default())?;
    let json = fs::read_to_string(&setup.modifications_path)?;
    let restored = ModificationsManager::from_json(reloaded.clone(), &json)?;
    assert_eq!(restored.annotations().len(), 1);

    let mut provider = FlameChartDataProvider::new(Config::default().layout);
    provider.set_model(Some(reloaded.clone()));
    provider.set_modifications(restored);
    assert_eq!(provider.timeline_data(false).len(), collapsed);
    let run_task = index_of(&mut provider, &reloaded, "RunTask");
    assert_eq!(
        provider.decorate_entry(run_task).map(|d| d.contains(&Decoration::HiddenDescendantsArrow)),
        Some(true)
    );
    Ok(())
}

#[rstest]
fn test_config_file(setup: TestSetup) -> Result<()> {
    let config = Config::load(setup.config_path.to_str().expect("utf-8 path"))?;
    assert_eq!(config.load.chunk_size, 64);
    assert_eq!(config.layout.long_task_threshold_ms, 100.0);
    assert_eq!(config.selection.debounce_ms, 100);

    let trace = setup.load(config.load.options(None))?;
    let mut provider = FlameChartDataProvider::new(config.layout);
    provider.set_model(Some(trace.clone()));
    provider.timeline_data(false);
    let run_task = index_of(&mut provider, &trace, "RunTask");
    assert_eq!(provider.decorate_entry(run_task), Some(&[][..]));
    Ok(())
}
