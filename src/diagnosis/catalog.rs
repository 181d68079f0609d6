use super::types::{ClassLabel, DiseaseInfo};
use crate::utils::error::DiagnosisError;
use crate::Result;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub const HEALTHY_ADVISORY: &str =
    "This plant is healthy! No action needed. Keep monitoring regularly.";

pub const FALLBACK_ADVISORY: &str = "Consult an expert for treatment guidance.";

/// 内置类别表，顺序与模型输出一致: (label, display_name, description, cure)
const BUILTIN_CLASSES: &[(&str, &str, &str, &str)] = &[
    (
        "Apple___Apple_scab",
        "Apple Scab",
        "Fungal disease (Venturia inaequalis) causing olive-green to black velvety spots on leaves and fruit.",
        "Use fungicides and remove infected leaves.",
    ),
    (
        "Apple___Black_rot",
        "Apple Black Rot",
        "Fungal disease (Botryosphaeria obtusa) producing purple-bordered leaf spots and rotting fruit.",
        "Prune out dead wood and cankers, remove mummified fruit, and apply a captan-based fungicide.",
    ),
    (
        "Apple___Cedar_apple_rust",
        "Cedar Apple Rust",
        "Rust fungus alternating between apple and juniper hosts, leaving bright orange leaf spots.",
        "Remove nearby juniper galls and apply a protective fungicide from bud break.",
    ),
    (
        "Apple___healthy",
        "Healthy Apple",
        "No visible signs of disease on the apple leaf.",
        "No treatment required.",
    ),
    (
        "Blueberry___healthy",
        "Healthy Blueberry",
        "No visible signs of disease on the blueberry leaf.",
        "No treatment required.",
    ),
    (
        "Cherry___Powdery_mildew",
        "Cherry Powdery Mildew",
        "Fungal growth (Podosphaera clandestina) forming white powdery patches on young leaves.",
        "Improve air circulation, remove infected shoots, and apply sulfur or potassium bicarbonate sprays.",
    ),
    (
        "Cherry___healthy",
        "Healthy Cherry",
        "No visible signs of disease on the cherry leaf.",
        "No treatment required.",
    ),
    (
        "Corn___Cercospora_leaf_spot",
        "Corn Gray Leaf Spot",
        "Fungal disease (Cercospora zeae-maydis) forming rectangular gray-tan lesions between leaf veins.",
        "Rotate crops, till under residue, and plant resistant hybrids; apply a strobilurin fungicide if severe.",
    ),
    (
        "Corn___Common_rust",
        "Corn Common Rust",
        "Fungal disease (Puccinia sorghi) producing brick-red pustules on both leaf surfaces.",
        "Plant resistant hybrids and apply a foliar fungicide when pustules appear early in the season.",
    ),
    (
        "Corn___Northern_Leaf_Blight",
        "Corn Northern Leaf Blight",
        "Fungal disease (Exserohilum turcicum) causing long cigar-shaped gray-green lesions.",
        "Use resistant hybrids, rotate crops, and apply fungicide at tasseling if lesions spread.",
    ),
    (
        "Corn___healthy",
        "Healthy Corn",
        "No visible signs of disease on the corn leaf.",
        "No treatment required.",
    ),
    (
        "Grape___Black_rot",
        "Grape Black Rot",
        "Fungal disease (Guignardia bidwellii) causing tan leaf spots and shriveled black berries.",
        "Remove mummified berries, prune for airflow, and apply fungicide from early shoot growth.",
    ),
    (
        "Grape___Esca",
        "Grape Esca (Black Measles)",
        "Trunk disease complex causing tiger-stripe leaf discoloration and spotted berries.",
        "Prune out infected wood during dry weather and protect pruning wounds.",
    ),
    (
        "Grape___Leaf_blight",
        "Grape Leaf Blight",
        "Fungal disease (Pseudocercospora vitis) producing irregular dark brown spots on older leaves.",
        "Remove fallen leaves and apply a copper-based fungicide.",
    ),
    (
        "Grape___healthy",
        "Healthy Grape",
        "No visible signs of disease on the grape leaf.",
        "No treatment required.",
    ),
    (
        "Orange___Citrus_greening",
        "Citrus Greening (Huanglongbing)",
        "Bacterial disease spread by the Asian citrus psyllid, causing blotchy yellow mottling.",
        "Remove infected trees, control psyllids, and use certified disease-free nursery stock.",
    ),
    (
        "Peach___Bacterial_spot",
        "Peach Bacterial Spot",
        "Bacterial disease (Xanthomonas arboricola) causing angular water-soaked leaf spots and shot holes.",
        "Plant resistant varieties and apply copper sprays during dormancy.",
    ),
    (
        "Peach___healthy",
        "Healthy Peach",
        "No visible signs of disease on the peach leaf.",
        "No treatment required.",
    ),
    (
        "Pepper___Bacterial_spot",
        "Pepper Bacterial Spot",
        "Bacterial disease (Xanthomonas spp.) causing small dark lesions on leaves and fruit.",
        "Use disease-free seed, avoid overhead watering, and apply copper-based bactericides.",
    ),
    (
        "Pepper___healthy",
        "Healthy Pepper",
        "No visible signs of disease on the pepper leaf.",
        "No treatment required.",
    ),
    (
        "Potato___Early_blight",
        "Potato Early Blight",
        "Fungal disease (Alternaria solani) causing dark concentric target-like spots on older leaves.",
        "Apply fungicide and practice crop rotation.",
    ),
    (
        "Potato___Late_blight",
        "Potato Late Blight",
        "Oomycete disease (Phytophthora infestans) causing water-soaked lesions that quickly turn brown.",
        "Destroy infected plants and apply a protective fungicide such as chlorothalonil.",
    ),
    (
        "Potato___healthy",
        "Healthy Potato",
        "No visible signs of disease on the potato leaf.",
        "No treatment required.",
    ),
    (
        "Raspberry___healthy",
        "Healthy Raspberry",
        "No visible signs of disease on the raspberry leaf.",
        "No treatment required.",
    ),
    (
        "Soybean___healthy",
        "Healthy Soybean",
        "No visible signs of disease on the soybean leaf.",
        "No treatment required.",
    ),
    (
        "Squash___Powdery_mildew",
        "Squash Powdery Mildew",
        "Fungal disease forming white powdery spots that spread across squash leaves.",
        "Remove affected leaves and apply sulfur, neem oil, or potassium bicarbonate.",
    ),
    (
        "Strawberry___Leaf_scorch",
        "Strawberry Leaf Scorch",
        "Fungal disease (Diplocarpon earlianum) causing small purple spots that merge and scorch the leaf.",
        "Remove infected foliage, renovate beds after harvest, and apply fungicide in spring.",
    ),
    (
        "Strawberry___healthy",
        "Healthy Strawberry",
        "No visible signs of disease on the strawberry leaf.",
        "No treatment required.",
    ),
    (
        "Tomato___Bacterial_spot",
        "Tomato Bacterial Spot",
        "Bacterial disease (Xanthomonas spp.) causing small greasy dark spots on leaves and fruit.",
        "Use certified seed, avoid overhead irrigation, and apply copper sprays.",
    ),
    (
        "Tomato___Early_blight",
        "Tomato Early Blight",
        "Fungal disease (Alternaria solani) producing concentric-ring lesions on lower leaves.",
        "Remove lower infected leaves, mulch the soil, and apply a chlorothalonil or copper fungicide.",
    ),
    (
        "Tomato___Late_blight",
        "Tomato Late Blight",
        "Oomycete disease (Phytophthora infestans) causing large greasy gray-green lesions on leaves.",
        "Remove infected leaves and apply a copper-based fungicide.",
    ),
    (
        "Tomato___Leaf_Mold",
        "Tomato Leaf Mold",
        "Fungal disease (Passalora fulva) forming yellow patches above and olive mold below the leaf.",
        "Lower humidity, increase ventilation, and apply a fungicide labeled for leaf mold.",
    ),
    (
        "Tomato___Septoria_leaf_spot",
        "Tomato Septoria Leaf Spot",
        "Fungal disease (Septoria lycopersici) causing many small circular spots with dark borders.",
        "Remove infected leaves, avoid wetting foliage, and apply a chlorothalonil fungicide.",
    ),
    (
        "Tomato___Spider_mites",
        "Tomato Spider Mites",
        "Two-spotted spider mite feeding causes stippled, yellowing leaves with fine webbing.",
        "Spray with insecticidal soap or neem oil and keep plants well watered.",
    ),
    (
        "Tomato___Target_Spot",
        "Tomato Target Spot",
        "Fungal disease (Corynespora cassiicola) producing brown lesions with concentric rings.",
        "Improve airflow, remove crop debris, and apply a protective fungicide.",
    ),
    (
        "Tomato___Tomato_Yellow_Leaf_Curl_Virus",
        "Tomato Yellow Leaf Curl Virus",
        "Whitefly-transmitted virus causing upward leaf curling, yellowing, and stunted growth.",
        "Remove infected plants, control whiteflies, and use resistant varieties.",
    ),
    (
        "Tomato___Tomato_mosaic_virus",
        "Tomato Mosaic Virus",
        "Mechanically transmitted virus causing mottled light and dark green leaf patterns.",
        "Remove infected plants, disinfect tools, and avoid handling plants after tobacco use.",
    ),
    (
        "Tomato___healthy",
        "Healthy Tomato",
        "No visible signs of disease on the tomato leaf.",
        "No treatment required.",
    ),
];

/// 类别表 + 病害说明表
///
/// `classes` 的顺序就是模型输出的顺序；说明按标签查找，缺失的标签使用通用建议。
#[derive(Debug, Clone)]
pub struct DiseaseCatalog {
    classes: Vec<ClassLabel>,
    entries: HashMap<ClassLabel, DiseaseInfo>,
    healthy_advisory: String,
    fallback_advisory: String,
}

/// JSON 目录文件格式
#[derive(Debug, Deserialize)]
struct CatalogFile {
    classes: Vec<ClassLabel>,
    #[serde(default)]
    entries: HashMap<ClassLabel, DiseaseInfo>,
    #[serde(default)]
    healthy_advisory: Option<String>,
    #[serde(default)]
    fallback_advisory: Option<String>,
}

impl DiseaseCatalog {
    pub fn new(
        classes: Vec<ClassLabel>,
        entries: HashMap<ClassLabel, DiseaseInfo>,
        healthy_advisory: impl Into<String>,
        fallback_advisory: impl Into<String>,
    ) -> Result<Self> {
        if classes.is_empty() {
            return Err(DiagnosisError::Catalog("Class list is empty".to_string()));
        }

        let mut seen = HashSet::with_capacity(classes.len());
        for label in &classes {
            if !seen.insert(label) {
                return Err(DiagnosisError::Catalog(format!("Duplicate class label '{}'", label)));
            }
        }

        if let Some(orphan) = entries.keys().find(|label| !seen.contains(label)) {
            return Err(DiagnosisError::Catalog(format!(
                "Entry '{}' does not correspond to any class",
                orphan
            )));
        }

        Ok(Self {
            classes,
            entries,
            healthy_advisory: healthy_advisory.into(),
            fallback_advisory: fallback_advisory.into(),
        })
    }

    /// 内置的 38 类目录
    pub fn builtin() -> Result<Self> {
        let mut classes = Vec::with_capacity(BUILTIN_CLASSES.len());
        let mut entries = HashMap::with_capacity(BUILTIN_CLASSES.len());

        for (label, display_name, description, cure) in BUILTIN_CLASSES {
            let label = ClassLabel::new(*label)?;
            entries.insert(
                label.clone(),
                DiseaseInfo {
                    display_name: display_name.to_string(),
                    description: description.to_string(),
                    cure: cure.to_string(),
                    reference_image_url: None,
                },
            );
            classes.push(label);
        }

        Self::new(classes, entries, HEALTHY_ADVISORY, FALLBACK_ADVISORY)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(
            file.classes,
            file.entries,
            file.healthy_advisory.unwrap_or_else(|| HEALTHY_ADVISORY.to_string()),
            file.fallback_advisory.unwrap_or_else(|| FALLBACK_ADVISORY.to_string()),
        )
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            DiagnosisError::Catalog(format!("Failed to read catalog {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// 从文件加载，未指定时使用内置目录
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                tracing::info!("Loading disease catalog from: {}", path.display());
                Self::from_json_file(path)
            }
            None => Self::builtin(),
        }
    }

    pub fn classes(&self) -> &[ClassLabel] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn label_at(&self, index: usize) -> Option<&ClassLabel> {
        self.classes.get(index)
    }

    pub fn info(&self, label: &ClassLabel) -> Option<&DiseaseInfo> {
        self.entries.get(label)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn healthy_advisory(&self) -> &str {
        &self.healthy_advisory
    }

    pub fn fallback_advisory(&self) -> &str {
        &self.fallback_advisory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = DiseaseCatalog::builtin().unwrap();
        assert_eq!(catalog.len(), 38);
        assert_eq!(catalog.entry_count(), 38);
        assert_eq!(catalog.label_at(0).unwrap().as_str(), "Apple___Apple_scab");
        assert_eq!(catalog.label_at(30).unwrap().as_str(), "Tomato___Late_blight");
        assert_eq!(catalog.label_at(37).unwrap().as_str(), "Tomato___healthy");
        assert!(catalog.label_at(38).is_none());

        let late_blight = ClassLabel::new("Tomato___Late_blight").unwrap();
        assert_eq!(
            catalog.info(&late_blight).unwrap().cure,
            "Remove infected leaves and apply a copper-based fungicide."
        );
        assert_eq!(catalog.healthy_advisory(), HEALTHY_ADVISORY);
        assert_eq!(catalog.fallback_advisory(), FALLBACK_ADVISORY);
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let label = ClassLabel::new("Apple___Black_rot").unwrap();
        let result = DiseaseCatalog::new(
            vec![label.clone(), label],
            HashMap::new(),
            HEALTHY_ADVISORY,
            FALLBACK_ADVISORY,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_orphan_entry_rejected() {
        let json = r#"{
            "classes": ["Apple___Black_rot"],
            "entries": {
                "Pear___Fire_blight": {
                    "display_name": "Fire Blight",
                    "description": "Bacterial disease",
                    "cure": "Prune"
                }
            }
        }"#;
        assert!(DiseaseCatalog::from_json_str(json).is_err());
    }

    #[test]
    fn test_json_catalog_with_defaults() {
        let json = r#"{
            "classes": ["Apple___Black_rot", "Apple___healthy", "healthy"],
            "entries": {
                "Apple___Black_rot": {
                    "display_name": "Black Rot",
                    "description": "Fungal disease",
                    "cure": "Prune cankers",
                    "reference_image_url": "https://example.org/black-rot.jpg"
                }
            }
        }"#;
        let catalog = DiseaseCatalog::from_json_str(json).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.entry_count(), 1);
        assert_eq!(catalog.fallback_advisory(), FALLBACK_ADVISORY);

        let label = ClassLabel::new("Apple___Black_rot").unwrap();
        assert_eq!(
            catalog.info(&label).unwrap().reference_image_url.as_deref(),
            Some("https://example.org/black-rot.jpg")
        );
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(DiseaseCatalog::from_json_str(r#"{"classes": []}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, r#"{"classes": ["Corn___Common_rust"], "fallback_advisory": "Ask"}"#)
            .unwrap();

        let catalog = DiseaseCatalog::load(Some(&path)).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.fallback_advisory(), "Ask");

        let missing = DiseaseCatalog::load(Some(&dir.path().join("missing.json")));
        assert!(matches!(missing, Err(DiagnosisError::Catalog(_))));
    }
}
