use quick_xml::{events::Event, Reader};
use std::{fs, path::Path};

/// Metadata lifted from a module's SubModule.xml manifest.
#[derive(Debug, Default, Clone)]
pub struct ModuleInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub official: bool,
    pub dependencies: Vec<String>,
    pub incompatible: Vec<String>,
}

pub fn read_submodule_xml(path: &Path) -> Option<ModuleInfo> {
    let bytes = fs::read(path).ok()?;
    Some(parse_submodule_xml(&bytes))
}

pub fn parse_submodule_xml(bytes: &[u8]) -> ModuleInfo {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut info = ModuleInfo::default();
    let mut in_depended = false;
    let mut in_incompatible = false;
    let mut in_submodules = false;
    let mut in_load_after = false;

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(_) => break,
        };
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"DependedModules" => {
                        if !is_empty {
                            in_depended = true;
                        }
                    }
                    b"IncompatibleModules" => {
                        if !is_empty {
                            in_incompatible = true;
                        }
                    }
                    b"SubModules" => {
                        if !is_empty {
                            in_submodules = true;
                        }
                    }
                    b"ModulesToLoadAfterThis" => {
                        if !is_empty {
                            in_load_after = true;
                        }
                    }
                    b"DependedModule" if in_depended => {
                        // optional dependencies do not constrain the order
                        let optional = attr_value(e, b"Optional")
                            .map(|value| value.eq_ignore_ascii_case("true"))
                            .unwrap_or(false);
                        if !optional {
                            if let Some(id) = attr_value(e, b"Id") {
                                if !id.trim().is_empty() {
                                    info.dependencies.push(id);
                                }
                            }
                        }
                    }
                    b"IncompatibleModule" if in_incompatible => {
                        if let Some(id) = attr_value(e, b"Id") {
                            if !id.trim().is_empty() {
                                info.incompatible.push(id);
                            }
                        }
                    }
                    tag if !in_depended && !in_incompatible && !in_submodules && !in_load_after => {
                        match tag {
                            b"Id" => {
                                if let Some(value) = attr_value(e, b"value") {
                                    info.id = value;
                                }
                            }
                            b"Name" => {
                                if let Some(value) = attr_value(e, b"value") {
                                    info.name = value;
                                }
                            }
                            b"Version" => {
                                if let Some(value) = attr_value(e, b"value") {
                                    info.version = value;
                                }
                            }
                            b"Official" => {
                                if let Some(value) = attr_value(e, b"value") {
                                    info.official = value.eq_ignore_ascii_case("true");
                                }
                            }
                            _ => {}
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"DependedModules" => in_depended = false,
                b"IncompatibleModules" => in_incompatible = false,
                b"SubModules" => in_submodules = false,
                b"ModulesToLoadAfterThis" => in_load_after = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    info
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            if let Ok(value) = attr.unescape_value() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Module>
  <Name value="Example Armoury"/>
  <Id value="ExampleArmoury"/>
  <Version value="v1.4.2"/>
  <Official value="false"/>
  <DefaultModule value="false"/>
  <ModuleCategory value="Singleplayer"/>
  <DependedModules>
    <DependedModule Id="Native"/>
    <DependedModule Id="SandBoxCore"/>
    <DependedModule Id="NiceToHave" Optional="true"/>
  </DependedModules>
  <IncompatibleModules>
    <IncompatibleModule Id="OldArmoury"/>
  </IncompatibleModules>
  <SubModules>
    <SubModule>
      <Name value="ExampleArmoury"/>
      <DLLName value="ExampleArmoury.dll"/>
      <SubModuleClassType value="ExampleArmoury.Main"/>
      <Tags>
        <Tag key="DedicatedServerType" value="none"/>
      </Tags>
    </SubModule>
  </SubModules>
</Module>
"#;

    #[test]
    fn parses_a_full_manifest() {
        let info = parse_submodule_xml(SAMPLE.as_bytes());
        assert_eq!(info.id, "ExampleArmoury");
        assert_eq!(info.name, "Example Armoury");
        assert_eq!(info.version, "v1.4.2");
        assert!(!info.official);
        assert_eq!(info.dependencies, vec!["Native", "SandBoxCore"]);
        assert_eq!(info.incompatible, vec!["OldArmoury"]);
    }

    #[test]
    fn submodule_names_do_not_clobber_the_module_name() {
        let info = parse_submodule_xml(SAMPLE.as_bytes());
        assert_eq!(info.name, "Example Armoury");
    }

    #[test]
    fn official_flag_is_case_insensitive() {
        let xml = r#"<Module><Id value="Native"/><Official value="TRUE"/></Module>"#;
        let info = parse_submodule_xml(xml.as_bytes());
        assert!(info.official);
    }

    #[test]
    fn tolerates_missing_sections() {
        let info = parse_submodule_xml(b"<Module><Id value=\"Bare\"/></Module>");
        assert_eq!(info.id, "Bare");
        assert!(info.dependencies.is_empty());
        assert!(info.incompatible.is_empty());
    }

    #[test]
    fn missing_file_is_none() {
        assert!(read_submodule_xml(Path::new("/nonexistent/SubModule.xml")).is_none());
    }
}
