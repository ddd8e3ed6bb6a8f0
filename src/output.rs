use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::candidate::{AddressTree, Candidate};
use crate::errors::AppResult;

/// One resolved row of the output table. Field names double as the CSV
/// header, and absent address parts come out as empty columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    pub input_address: String,
    pub score: i64,
    pub chi_region: String,
    pub chi_district: String,
    pub chi_estate: String,
    pub chi_building_name: String,
    pub chi_street_name: String,
    pub chi_building_no: String,
    pub chi_block: String,
    pub eng_region: String,
    pub eng_district: String,
    pub eng_estate: String,
    pub eng_building_name: String,
    pub eng_street_name: String,
    pub eng_building_no: String,
    pub eng_block: String,
}

impl OutputRecord {
    pub fn from_candidate(input_address: &str, candidate: &Candidate) -> OutputRecord {
        let chi = &candidate.chi;
        let eng = &candidate.eng;
        OutputRecord {
            input_address: input_address.to_string(),
            score: candidate.provider_score as i64,
            chi_region: text(chi, &["Region"]),
            chi_district: text(chi, &["ChiDistrict", "DcDistrict"]),
            chi_estate: text(chi, &["ChiEstate", "EstateName"]),
            chi_building_name: text(chi, &["BuildingName"]),
            chi_street_name: text(chi, &["ChiStreet", "StreetName"]),
            chi_building_no: text(chi, &["ChiStreet", "BuildingNoFrom"]),
            chi_block: text(chi, &["ChiBlock", "BlockNo"]),
            eng_region: text(eng, &["Region"]),
            eng_district: text(eng, &["EngDistrict", "DcDistrict"]),
            eng_estate: text(eng, &["EngEstate", "EstateName"]),
            eng_building_name: text(eng, &["BuildingName"]),
            eng_street_name: text(eng, &["EngStreet", "StreetName"]),
            eng_building_no: text(eng, &["EngStreet", "BuildingNoFrom"]),
            eng_block: text(eng, &["EngBlock", "BlockNo"]),
        }
    }
}

fn text(tree: &AddressTree, path: &[&str]) -> String {
    tree.text_at(path).unwrap_or_default().to_string()
}

/// Writes resolved rows as CSV, creating the parent directory when the
/// target sits in one that does not exist yet.
pub fn write_records(path: &Path, records: &[OutputRecord]) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::flatten_suggestions;
    use serde_json::json;

    fn sample_candidate() -> Candidate {
        let item = json!({
            "Address": {
                "PremisesAddress": {
                    "ChiPremisesAddress": {
                        "Region": "香港",
                        "ChiDistrict": { "DcDistrict": "中西區" },
                        "ChiStreet": { "StreetName": "皇后大道中", "BuildingNoFrom": "99" },
                        "BuildingName": "中環中心",
                    },
                    "EngPremisesAddress": {
                        "Region": "HK",
                        "EngDistrict": { "DcDistrict": "CENTRAL & WESTERN DISTRICT" },
                        "EngStreet": { "StreetName": "QUEEN'S ROAD CENTRAL", "BuildingNoFrom": "99" },
                        "BuildingName": "THE CENTER",
                    },
                    "GeospatialInformation": { "Latitude": 22.28 },
                }
            },
            "ValidationInformation": { "Score": 87.6 },
        });
        flatten_suggestions(&[item]).unwrap().remove(0)
    }

    #[test]
    fn extracts_both_language_trees() {
        let record = OutputRecord::from_candidate("香港皇后大道中99號", &sample_candidate());
        assert_eq!(record.input_address, "香港皇后大道中99號");
        assert_eq!(record.chi_region, "香港");
        assert_eq!(record.chi_district, "中西區");
        assert_eq!(record.chi_street_name, "皇后大道中");
        assert_eq!(record.chi_building_no, "99");
        assert_eq!(record.eng_street_name, "QUEEN'S ROAD CENTRAL");
        assert_eq!(record.eng_building_name, "THE CENTER");
        // absent parts turn into empty columns
        assert_eq!(record.chi_estate, "");
        assert_eq!(record.eng_block, "");
    }

    #[test]
    fn truncates_provider_score() {
        let record = OutputRecord::from_candidate("香港", &sample_candidate());
        assert_eq!(record.score, 87);
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("scanned_addresses.csv");
        let record = OutputRecord::from_candidate("香港皇后大道中99號", &sample_candidate());

        write_records(&path, &[record]).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("input_address,score,chi_region"), "{header}");
        let row = lines.next().unwrap();
        assert!(row.contains("皇后大道中"), "{row}");
        assert!(row.contains(",87,"), "{row}");
    }
}
