//! Field checks against an in-process extraction plugin

use std::ffi::CStr;
use std::sync::Arc;
use sysplug_core::event::{Event, EventSources, PLUGIN_EVENT_CODE};
use sysplug_filter::{FieldValue, FilterError, IndexError, PluginFieldCheck};
use sysplug_plugin_api::testing::{MockArg, MockModule, MockValue};
use sysplug_plugin_api::{Plugin, TableRegistry};

const FIELDS: &str = r#"[
    {"type": "uint64", "name": "myfield", "desc": "Indexed value", "arg": {"isIndex": true}},
    {"type": "uint64", "name": "myfield.count", "desc": "A counter"},
    {"type": "string", "name": "mykey", "desc": "Keyed value", "arg": {"isRequired": true, "isKey": true}},
    {"type": "string", "name": "mylist", "desc": "Some names", "isList": true},
    {"type": "bool", "name": "myflag", "desc": "A flag"}
]"#;

fn source_name() -> &'static CStr {
    CStr::from_bytes_with_nul(b"mock_source\0").unwrap()
}

fn event(num: u64, source_idx: Option<u32>, event_type: u16) -> Event<'static> {
    Event {
        num,
        event_type,
        source_idx,
        source_name: source_name(),
        raw: b"raw",
        payload: b"payload",
    }
}

struct Fixture {
    mock: MockModule,
    plugin: Arc<Plugin>,
    sources: EventSources,
}

fn fixture() -> Fixture {
    let mock = MockModule::new("mock")
        .with_extraction(FIELDS)
        .with_extract_sources(r#"["mock_source"]"#)
        .with_value("myfield", MockValue::Uint64(vec![7]))
        .with_value("mykey", MockValue::String(vec!["value".to_string()]))
        .with_value("mylist", MockValue::String(vec!["a".to_string(), "b".to_string()]))
        .with_value("myflag", MockValue::Bool(vec![true]));
    let plugin = Plugin::from_api(mock.api(), Arc::new(TableRegistry::new())).unwrap();
    plugin.init("").unwrap();

    let sources = EventSources::new();
    assert_eq!(sources.add("mock_source"), 1);
    assert_eq!(sources.add("other_source"), 2);
    Fixture {
        mock,
        plugin,
        sources,
    }
}

fn check(fx: &Fixture, text: &str) -> PluginFieldCheck {
    let mut check = PluginFieldCheck::new(fx.plugin.clone(), fx.sources.clone()).unwrap();
    check.parse_field_name(text).unwrap();
    check
}

#[test]
fn test_index_argument_consumes_brackets() {
    let fx = fixture();
    let mut check = PluginFieldCheck::new(fx.plugin.clone(), fx.sources.clone()).unwrap();
    let consumed = check.parse_field_name("myfield[3] = 5").unwrap();
    assert_eq!(consumed, Some(10));
    assert_eq!(check.field().unwrap().name, "myfield");
    let arg = check.argument().unwrap();
    assert_eq!(arg.index(), 3);
    assert_eq!(arg.as_str(), "3");
    assert_eq!(arg.key(), None);
}

#[test]
fn test_invalid_index_argument() {
    let fx = fixture();
    let mut check = PluginFieldCheck::new(fx.plugin.clone(), fx.sources.clone()).unwrap();
    let err = check.parse_field_name("myfield[foo]").unwrap_err();
    assert!(err.is_syntax());
    match err {
        FilterError::InvalidIndex {
            reason, argument, ..
        } => {
            assert_eq!(reason, IndexError::NotDigits);
            assert_eq!(argument, "foo");
        }
        other => panic!("unexpected error: {}", other),
    }

    let err = check.parse_field_name("myfield[01]").unwrap_err();
    assert_eq!(
        err.to_string(),
        "filter myfield[01] myfield has an invalid index argument starting with 0: 01"
    );
}

#[test]
fn test_longest_field_name_wins() {
    let fx = fixture();
    let mut check = PluginFieldCheck::new(fx.plugin.clone(), fx.sources.clone()).unwrap();
    assert_eq!(check.parse_field_name("myfield.count > 1").unwrap(), Some(13));
    assert_eq!(check.field().unwrap().name, "myfield.count");
    assert!(check.argument().is_none());

    assert_eq!(check.parse_field_name("proc.name").unwrap(), None);
}

#[test]
fn test_argument_rules() {
    let fx = fixture();
    let mut check = PluginFieldCheck::new(fx.plugin.clone(), fx.sources.clone()).unwrap();

    let err = check.parse_field_name("myfield.count[1]").unwrap_err();
    assert_eq!(
        err.to_string(),
        "filter myfield.count[1] myfield.count does not allow nor require an argument but one is provided: 1"
    );

    let err = check.parse_field_name("mykey = x").unwrap_err();
    assert!(matches!(err, FilterError::ArgumentRequired { .. }));

    let err = check.parse_field_name("mykey[abc").unwrap_err();
    assert!(matches!(err, FilterError::MalformedArgument { .. }));

    assert_eq!(check.parse_field_name("mykey[12]").unwrap(), Some(9));
    let arg = check.argument().unwrap();
    assert_eq!(arg.key(), Some("12"));
    assert_eq!(arg.index(), 0);
}

#[test]
fn test_extract_values_and_argument() {
    let fx = fixture();
    let counters = fx.mock.counters();

    let mut indexed = check(&fx, "myfield[3]");
    let values = indexed.extract(&event(1, Some(1), PLUGIN_EVENT_CODE)).unwrap();
    assert_eq!(values, Some(vec![FieldValue::Uint64(7)]));
    assert_eq!(counters.last_arg(), Some(MockArg::Index(3)));

    let mut keyed = check(&fx, "mykey[user]");
    let values = keyed.extract(&event(2, Some(1), PLUGIN_EVENT_CODE)).unwrap();
    assert_eq!(values, Some(vec![FieldValue::String("value".to_string())]));
    assert_eq!(counters.last_arg(), Some(MockArg::Key("user".to_string())));

    let mut list = check(&fx, "mylist");
    let values = list.extract(&event(3, Some(1), PLUGIN_EVENT_CODE)).unwrap().unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[1].as_str(), Some("b"));

    let mut flag = check(&fx, "myflag");
    let values = flag.extract(&event(4, Some(1), PLUGIN_EVENT_CODE)).unwrap();
    assert_eq!(values, Some(vec![FieldValue::Bool(true)]));
}

#[test]
fn test_reparse_switches_extracted_field() {
    let fx = fixture();
    let mut check = check(&fx, "myflag");
    let evt = event(1, Some(1), PLUGIN_EVENT_CODE);
    assert_eq!(check.extract(&evt).unwrap(), Some(vec![FieldValue::Bool(true)]));

    assert_eq!(check.parse_field_name("mykey[user]").unwrap(), Some(11));
    assert_eq!(
        check.extract(&evt).unwrap(),
        Some(vec![FieldValue::String("value".to_string())])
    );
    assert_eq!(check.stats().total, 2);
    assert_eq!(check.stats().extracted, 2);
}

#[test]
fn test_incompatible_events_skip_module() {
    let fx = fixture();
    let counters = fx.mock.counters();
    let mut check = check(&fx, "myfield[0]");

    // unknown source
    assert_eq!(check.extract(&event(1, None, PLUGIN_EVENT_CODE)).unwrap(), None);
    // syscall and other_source are not in the plugin's source set
    assert_eq!(check.extract(&event(2, Some(0), PLUGIN_EVENT_CODE)).unwrap(), None);
    assert_eq!(check.extract(&event(3, Some(2), PLUGIN_EVENT_CODE)).unwrap(), None);
    // source index the engine does not know yet
    assert_eq!(check.extract(&event(4, Some(9), PLUGIN_EVENT_CODE)).unwrap(), None);
    // event code outside the plugin's set
    assert_eq!(check.extract(&event(5, Some(1), 1)).unwrap(), None);
    assert_eq!(counters.extract_calls(), 0);
    assert_eq!(check.stats().rejected, 5);

    assert!(check.extract(&event(6, Some(1), PLUGIN_EVENT_CODE)).unwrap().is_some());
    assert_eq!(counters.extract_calls(), 1);
    assert_eq!(check.stats().extracted, 1);
}

#[test]
fn test_missing_value_is_none() {
    let fx = fixture();
    let mut check = check(&fx, "myfield.count");
    assert_eq!(check.extract(&event(1, Some(1), PLUGIN_EVENT_CODE)).unwrap(), None);
    assert_eq!(check.stats().empty, 1);
}

#[test]
fn test_failing_module_yields_no_value() {
    let mock = MockModule::new("broken")
        .with_extraction(FIELDS)
        .failing_extraction();
    let plugin = Plugin::from_api(mock.api(), Arc::new(TableRegistry::new())).unwrap();
    plugin.init("").unwrap();

    let mut check = PluginFieldCheck::new(plugin, EventSources::new()).unwrap();
    check.parse_field_name("myflag").unwrap();
    assert_eq!(check.extract(&event(1, Some(0), PLUGIN_EVENT_CODE)).unwrap(), None);
    assert_eq!(mock.counters().extract_calls(), 1);
}

#[test]
fn test_requires_extraction_and_field() {
    let mock = MockModule::new("parser").with_parsing();
    let plugin = Plugin::from_api(mock.api(), Arc::new(TableRegistry::new())).unwrap();
    let err = PluginFieldCheck::new(plugin, EventSources::new()).unwrap_err();
    assert!(matches!(err, FilterError::NotExtractionCapable(_)));

    let fx = fixture();
    let mut check = PluginFieldCheck::new(fx.plugin.clone(), fx.sources.clone()).unwrap();
    assert_eq!(check.info_name(), "mock (plugin)");
    assert!(matches!(
        check.extract(&event(1, Some(1), PLUGIN_EVENT_CODE)),
        Err(FilterError::NoField)
    ));
}

#[test]
fn test_extract_before_init_is_misuse() {
    let mock = MockModule::new("mock").with_extraction(FIELDS);
    let plugin = Plugin::from_api(mock.api(), Arc::new(TableRegistry::new())).unwrap();
    let mut check = PluginFieldCheck::new(plugin, EventSources::new()).unwrap();
    check.parse_field_name("myflag").unwrap();
    let err = check.extract(&event(1, Some(0), PLUGIN_EVENT_CODE)).unwrap_err();
    assert!(matches!(err, FilterError::Plugin(ref e) if e.is_misuse()));
}
