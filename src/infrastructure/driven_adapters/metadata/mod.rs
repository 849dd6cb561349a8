//! ArcGIS Metadata Documents
//!
//! Builds the ArcGIS metadata XML attached to exported items and the field
//! list sent with tabular publish calls.

pub mod xml;

use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

use crate::domain::models::metadata::{FieldDescription, ResourceMetadata};
use crate::domain::models::resource::ResourceProperties;
use crate::infrastructure::driven_adapters::config::MetadataSection;
use crate::shared::errors::{DataPortalError, Result};
use xml::XmlElement;

pub use crate::domain::models::metadata::{build_field_mappings, FieldMapping};

lazy_static! {
    static ref URL_PATTERN: Regex = Regex::new(
        r"(?i)((https?):((//)|(\\\\))+[\w\d:#@%/;$()~_?+-=\\\.&]+[^\.\s])"
    )
    .expect("valid regex");
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"([\w\-\.]+@(\w[\w\-]+\.)+[\w\-]+)").expect("valid regex");
}

const BASIC_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <dataIdInfo>
    <idCitation>
      <resTitle></resTitle>
      <date><pubDate></pubDate></date>
      <citRespParty>
        <rpIndName></rpIndName>
        <rpOrgName></rpOrgName>
        <role><RoleCd value="006"/></role>
        <rpCntInfo>
          <cntAddress>
            <eMailAdd></eMailAdd>
            <delPoint></delPoint>
            <city></city>
            <adminArea></adminArea>
            <postCode></postCode>
          </cntAddress>
          <cntPhone><voiceNum></voiceNum></cntPhone>
          <cntOnlineRes><linkage></linkage></cntOnlineRes>
        </rpCntInfo>
      </citRespParty>
      <citOnlineRes>
        <linkage></linkage>
        <orName></orName>
      </citOnlineRes>
      <otherCitDet></otherCitDet>
    </idCitation>
    <idAbs></idAbs>
    <idCredit></idCredit>
    <suppInfo></suppInfo>
    <resMaint><usrDefFreq><duration></duration></usrDefFreq></resMaint>
    <resConst><Consts><useLimit></useLimit></Consts></resConst>
  </dataIdInfo>
  <mdContact>
    <rpIndName></rpIndName>
    <rpOrgName></rpOrgName>
    <rpCntInfo>
      <cntAddress>
        <eMailAdd></eMailAdd>
        <city></city>
        <postCode></postCode>
      </cntAddress>
      <cntPhone><voiceNum></voiceNum></cntPhone>
    </rpCntInfo>
  </mdContact>
  <dqInfo>
    <dataLineage><statement></statement></dataLineage>
  </dqInfo>
</metadata>
"#;

/// Blank out placeholder values and turn URLs and e-mail addresses into links
#[must_use]
pub fn clean_metadata_string(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };
    if matches!(text, "N/A" | "nan" | "") {
        return String::new();
    }
    let linked = URL_PATTERN.replace_all(text, r#"<a href="$1" target="_blank">$1</a>"#);
    EMAIL_PATTERN
        .replace_all(&linked, r#"<a href="mailto:$1">$1</a>"#)
        .into_owned()
}

/// Find the first `tag` child of `parent` or append one, then set its text
/// when `text` is not blank
pub fn upsert_element<'a>(parent: &'a mut XmlElement, tag: &str, text: &str) -> &'a mut XmlElement {
    let index = match parent.children.iter().position(|c| c.name == tag) {
        Some(index) => index,
        None => {
            parent.children.push(XmlElement::new(tag));
            parent.children.len() - 1
        }
    };
    let element = &mut parent.children[index];
    if !text.trim().is_empty() {
        element.text = Some(text.to_string());
    }
    element
}

fn io_error(message: &str, path: &Path, err: &std::io::Error) -> DataPortalError {
    DataPortalError::metadata(message).with_details(format!("{}: {err}", path.display()))
}

/// Creates and fills ArcGIS metadata documents
#[derive(Debug, Clone)]
pub struct MetadataManager {
    template: Option<PathBuf>,
    defaults: MetadataSection,
}

impl MetadataManager {
    #[must_use]
    pub fn new(template: Option<PathBuf>, defaults: MetadataSection) -> Self {
        Self { template, defaults }
    }

    /// Write the starting document at `output`: a copy of the configured
    /// template when it exists, otherwise the built-in skeleton
    ///
    /// # Errors
    ///
    /// Returns `DataPortalError::Metadata` if the file cannot be written.
    pub fn initialize_metadata_file(&self, output: &Path) -> Result<()> {
        let content = match self.template.as_deref().filter(|t| t.exists()) {
            Some(template) => fs::read_to_string(template)
                .map_err(|e| io_error("Failed to initialize metadata file", template, &e))?,
            None => BASIC_TEMPLATE.to_string(),
        };
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| io_error("Failed to initialize metadata file", parent, &e))?;
        }
        fs::write(output, content)
            .map_err(|e| io_error("Failed to initialize metadata file", output, &e))?;
        tracing::debug!(path = %output.display(), "Initialized metadata file");
        Ok(())
    }

    /// Fill the document at `path` from a metadata record, creating it first
    /// if needed
    ///
    /// # Errors
    ///
    /// Returns `DataPortalError::Metadata` if the document cannot be read,
    /// parsed or written.
    pub fn update_metadata_xml(
        &self,
        path: &Path,
        metadata: &ResourceMetadata,
        properties: &ResourceProperties,
    ) -> Result<()> {
        if !path.exists() {
            self.initialize_metadata_file(path)?;
        }
        let content = fs::read_to_string(path)
            .map_err(|e| io_error("Failed to update metadata XML", path, &e))?;
        let mut root = xml::parse(&content).map_err(|e| {
            DataPortalError::metadata("Failed to update metadata XML").with_details(e.to_string())
        })?;

        self.update_contact_info(&mut root, metadata);
        self.update_data_identification(&mut root, metadata, properties);
        update_constraints(&mut root, metadata);
        update_data_quality(&mut root, metadata);
        let fields = metadata.fields();
        if !fields.is_empty() {
            update_field_info(&mut root, &fields);
        }

        let rendered = xml::to_string(&root)?;
        fs::write(path, rendered).map_err(|e| io_error("Failed to update metadata XML", path, &e))?;
        tracing::debug!(path = %path.display(), "Updated metadata file");
        Ok(())
    }

    fn update_contact_info(&self, root: &mut XmlElement, metadata: &ResourceMetadata) {
        let Some(contact) = root.find_mut("mdContact") else {
            return;
        };
        upsert_element(contact, "rpIndName", &metadata.text_or("contact_name", ""));
        upsert_element(contact, "rpOrgName", &metadata.text_or("organization_name", ""));

        let info = upsert_element(contact, "rpCntInfo", "");
        let address = upsert_element(info, "cntAddress", "");
        upsert_element(address, "eMailAdd", &metadata.text_or("contact_email", ""));
        upsert_element(address, "city", &metadata.text_or("contact_city", &self.defaults.contact_city));
        upsert_element(address, "postCode", &metadata.text_or("contact_zip", &self.defaults.contact_zip));
        let phone = upsert_element(info, "cntPhone", "");
        upsert_element(phone, "voiceNum", &metadata.text_or("contact_phone", ""));
    }

    fn update_data_identification(
        &self,
        root: &mut XmlElement,
        metadata: &ResourceMetadata,
        properties: &ResourceProperties,
    ) {
        let Some(info) = root.find_mut("dataIdInfo") else {
            return;
        };
        let text = |key: &str| metadata.text_or(key, "");
        let website = metadata.text_or("psrc_website", &self.defaults.website);

        let citation = upsert_element(info, "idCitation", "");
        upsert_element(citation, "resTitle", &properties.title);
        let date = upsert_element(citation, "date", "");
        upsert_element(date, "pubDate", &text("date_last_updated"));

        let party = upsert_element(citation, "citRespParty", "");
        upsert_element(party, "rpIndName", &text("contact_name"));
        upsert_element(party, "rpOrgName", &self.defaults.organization_name);
        let role = upsert_element(party, "role", "");
        upsert_element(role, "RoleCd", "").set_attribute("value", "006");

        let contact_info = upsert_element(party, "rpCntInfo", "");
        let address = upsert_element(contact_info, "cntAddress", "");
        upsert_element(address, "eMailAdd", &text("contact_email"));
        upsert_element(address, "delPoint", &text("contact_street_address"));
        upsert_element(address, "city", &text("contact_city"));
        upsert_element(address, "adminArea", &text("contact_state"));
        upsert_element(address, "postCode", &text("contact_zip"));
        let phone = upsert_element(contact_info, "cntPhone", "");
        upsert_element(phone, "voiceNum", &text("contact_phone"));
        let online = upsert_element(contact_info, "cntOnlineRes", "");
        upsert_element(online, "linkage", &website);

        citation.remove_all("citOnlineRes");
        let resource = upsert_element(citation, "citOnlineRes", "");
        upsert_element(resource, "linkage", &website);
        upsert_element(resource, "orName", "Data on PSRC Webpage");
        upsert_element(
            citation,
            "otherCitDet",
            &format!("time period: {}", text("time_period")),
        );

        let abstract_text = ["summary", "summary_addendum", "summary_footer"]
            .into_iter()
            .map(|key| clean_metadata_string(metadata.text(key).as_deref()))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("<br/><br/>");
        upsert_element(info, "idAbs", &abstract_text);
        upsert_element(info, "idCredit", &text("data_source"));
        upsert_element(
            info,
            "suppInfo",
            &clean_metadata_string(metadata.text("supplemental_info").as_deref()),
        );
        let maintenance = upsert_element(info, "resMaint", "");
        let frequency = upsert_element(maintenance, "usrDefFreq", "");
        upsert_element(frequency, "duration", &text("update_cadence"));
    }
}

fn update_constraints(root: &mut XmlElement, metadata: &ResourceMetadata) {
    let Some(info) = root.find_mut("dataIdInfo") else {
        return;
    };
    info.remove_all("resConst");
    let constraints = info.append(XmlElement::new("resConst")).append(XmlElement::new("Consts"));
    upsert_element(
        constraints,
        "useLimit",
        &clean_metadata_string(metadata.text("use_constraints").as_deref()),
    );
}

fn update_data_quality(root: &mut XmlElement, metadata: &ResourceMetadata) {
    let quality = upsert_element(root, "dqInfo", "");
    let lineage = upsert_element(quality, "dataLineage", "");
    upsert_element(
        lineage,
        "statement",
        &clean_metadata_string(metadata.text("data_lineage").as_deref()),
    );
}

fn update_field_info(root: &mut XmlElement, fields: &[FieldDescription]) {
    root.remove_all("eainfo");
    let entity_info = root.append(XmlElement::new("eainfo"));
    for field in fields {
        let entity = entity_info
            .append(XmlElement::new("detailed"))
            .append(XmlElement::new("enttyp"));
        upsert_element(entity, "enttypl", &field.title);
        upsert_element(entity, "enttypd", &field.description);
    }
}
