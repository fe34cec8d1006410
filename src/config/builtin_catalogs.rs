// ==========================================
// 表格数据导入管道 - 内置实体目录与模式表
// ==========================================
// 实体: shipments / products / containers
// 模式表顺序即优先级（先命中者胜出），含意大利语与英语列名
// ==========================================

use crate::domain::{FieldCatalog, FieldPatterns, FieldType, PatternTable, TargetField};

pub const SHIPMENTS: &str = "shipments";
pub const PRODUCTS: &str = "products";
pub const CONTAINERS: &str = "containers";

/// 内置实体名
pub const BUILTIN_ENTITIES: [&str; 3] = [SHIPMENTS, PRODUCTS, CONTAINERS];

/// 内置实体的目录 + 模式表 + 默认冲突键
#[derive(Debug, Clone)]
pub struct BuiltinEntity {
    pub catalog: FieldCatalog,
    pub patterns: PatternTable,
    pub conflict_key: &'static str,
}

/// 按实体名查找内置定义
pub fn builtin_entity(entity: &str) -> Option<BuiltinEntity> {
    match entity {
        SHIPMENTS => Some(shipments()),
        PRODUCTS => Some(products()),
        CONTAINERS => Some(containers()),
        _ => None,
    }
}

// ==========================================
// products
// ==========================================
fn products() -> BuiltinEntity {
    let catalog = FieldCatalog::new(
        PRODUCTS,
        vec![
            TargetField::new("sku", "商品编码", FieldType::Text)
                .required()
                .with_description("供应商商品编码，用作更新时的匹配键"),
            TargetField::new("description", "商品描述", FieldType::Text).required(),
            TargetField::new("unit_price", "单价", FieldType::Currency),
            TargetField::new("quantity", "数量", FieldType::Number),
            TargetField::new("weight", "重量(kg)", FieldType::Number),
            TargetField::new("vat_rate", "税率", FieldType::Percentage),
            TargetField::new("category", "类别", FieldType::Select)
                .with_options(&["raw_material", "finished_good", "packaging", "spare_part"]),
            TargetField::new("active", "是否启用", FieldType::Boolean),
        ],
    );

    let patterns = vec![
        FieldPatterns::new("sku", &["sku", "cod", "codice", "code", "articolo", "item"]),
        FieldPatterns::new("description", &["descrizione", "description", "desc", "nome", "name"]),
        FieldPatterns::new("unit_price", &["prezzo", "price", "costo", "cost"]),
        FieldPatterns::new("quantity", &["quantit", "qty", "qta", "quantity"]),
        FieldPatterns::new("weight", &["peso", "weight"]),
        FieldPatterns::new("vat_rate", &["aliquota", "vat", "iva", "tax"]),
        FieldPatterns::new("category", &["categoria", "category", "famiglia"]),
        FieldPatterns::new("active", &["attivo", "active", "enabled"]),
    ];

    BuiltinEntity {
        catalog,
        patterns,
        conflict_key: "sku",
    }
}

// ==========================================
// shipments
// ==========================================
fn shipments() -> BuiltinEntity {
    let catalog = FieldCatalog::new(
        SHIPMENTS,
        vec![
            TargetField::new("reference", "运单号", FieldType::Text).required(),
            TargetField::new("origin", "起运地", FieldType::Text),
            TargetField::new("destination", "目的地", FieldType::Text).required(),
            TargetField::new("carrier", "承运商", FieldType::Text),
            TargetField::new("status", "状态", FieldType::Select)
                .with_options(&["pending", "in_transit", "delivered", "cancelled"]),
            TargetField::new("ship_date", "发运日期", FieldType::Date),
            TargetField::new("delivery_date", "交付日期", FieldType::Date),
            TargetField::new("weight_kg", "毛重(kg)", FieldType::Number),
            TargetField::new("cost", "运费", FieldType::Currency),
            TargetField::new("insured", "是否投保", FieldType::Boolean),
        ],
    );

    // 日期与状态列名常含 "spedizione"，须排在 reference 之前
    let patterns = vec![
        FieldPatterns::new("ship_date", &["dataspedizione", "datapartenza", "shipdate", "shippingdate"]),
        FieldPatterns::new("delivery_date", &["dataconsegna", "deliverydate", "consegna", "eta"]),
        FieldPatterns::new("status", &["stato", "status"]),
        FieldPatterns::new("reference", &["riferimento", "rif", "reference", "spedizione", "shipment", "awb"]),
        FieldPatterns::new("origin", &["origine", "partenza", "origin"]),
        FieldPatterns::new("destination", &["destinazione", "destination", "dest"]),
        FieldPatterns::new("carrier", &["vettore", "corriere", "carrier"]),
        FieldPatterns::new("weight_kg", &["peso", "weight"]),
        FieldPatterns::new("cost", &["costo", "cost", "importo", "nolo"]),
        FieldPatterns::new("insured", &["assicurat", "insured"]),
    ];

    BuiltinEntity {
        catalog,
        patterns,
        conflict_key: "reference",
    }
}

// ==========================================
// containers
// ==========================================
fn containers() -> BuiltinEntity {
    let catalog = FieldCatalog::new(
        CONTAINERS,
        vec![
            TargetField::new("container_number", "箱号", FieldType::Text)
                .required()
                .with_description("ISO 6346 箱号，如 MSCU1234567"),
            TargetField::new("container_type", "箱型", FieldType::Select)
                .with_options(&["20DV", "40DV", "40HC", "20RF", "40RF"]),
            TargetField::new("tare_weight", "皮重", FieldType::Number),
            TargetField::new("max_payload", "最大载重", FieldType::Number),
            TargetField::new("seal_number", "封条号", FieldType::Text),
            TargetField::new("shipment_reference", "关联运单", FieldType::Text),
            TargetField::new("gate_in_date", "进场日期", FieldType::Date),
            TargetField::new("reefer", "冷藏箱", FieldType::Boolean),
        ],
    );

    // "Tipo container" / "Container type" 须先命中箱型
    let patterns = vec![
        FieldPatterns::new("container_type", &["tipo", "type", "iso"]),
        FieldPatterns::new("gate_in_date", &["gatein", "dataingresso", "ingresso"]),
        FieldPatterns::new("container_number", &["container", "contenitore", "cntr", "unit"]),
        FieldPatterns::new("tare_weight", &["tara", "tare"]),
        FieldPatterns::new("max_payload", &["portata", "payload", "maxgross"]),
        FieldPatterns::new("seal_number", &["sigillo", "seal"]),
        FieldPatterns::new("shipment_reference", &["spedizione", "shipment", "booking"]),
        FieldPatterns::new("reefer", &["reefer", "frigo"]),
    ];

    BuiltinEntity {
        catalog,
        patterns,
        conflict_key: "container_number",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::auto_map;

    fn headers(list: &[&str]) -> Vec<String> {
        list.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn test_every_pattern_field_is_in_catalog() {
        for entity in BUILTIN_ENTITIES {
            let builtin = builtin_entity(entity).unwrap();
            for entry in &builtin.patterns {
                assert!(
                    builtin.catalog.contains(&entry.field),
                    "{} 的模式表引用了未知字段 {}",
                    entity,
                    entry.field
                );
            }
            assert!(builtin.catalog.contains(builtin.conflict_key));
        }
        assert!(builtin_entity("invoices").is_none());
    }

    #[test]
    fn test_products_italian_supplier_headers() {
        let builtin = builtin_entity(PRODUCTS).unwrap();
        let mapping = auto_map(
            &headers(&["Cod.Art", "Descrizione", "Prezzo", "Quantità", "Aliquota IVA"]),
            &builtin.patterns,
        );
        assert_eq!(mapping.target_of("Cod.Art"), Some("sku"));
        assert_eq!(mapping.target_of("Descrizione"), Some("description"));
        assert_eq!(mapping.target_of("Prezzo"), Some("unit_price"));
        assert_eq!(mapping.target_of("Quantità"), Some("quantity"));
        assert_eq!(mapping.target_of("Aliquota IVA"), Some("vat_rate"));
    }

    #[test]
    fn test_shipment_dates_do_not_fall_into_reference() {
        let builtin = builtin_entity(SHIPMENTS).unwrap();
        let mapping = auto_map(
            &headers(&["Rif. Spedizione", "Data spedizione", "Data consegna", "Stato spedizione"]),
            &builtin.patterns,
        );
        assert_eq!(mapping.target_of("Rif. Spedizione"), Some("reference"));
        assert_eq!(mapping.target_of("Data spedizione"), Some("ship_date"));
        assert_eq!(mapping.target_of("Data consegna"), Some("delivery_date"));
        assert_eq!(mapping.target_of("Stato spedizione"), Some("status"));
    }

    #[test]
    fn test_container_type_precedes_number() {
        let builtin = builtin_entity(CONTAINERS).unwrap();
        let mapping = auto_map(
            &headers(&["Numero container", "Tipo container", "Tara"]),
            &builtin.patterns,
        );
        assert_eq!(mapping.target_of("Numero container"), Some("container_number"));
        assert_eq!(mapping.target_of("Tipo container"), Some("container_type"));
        assert_eq!(mapping.target_of("Tara"), Some("tare_weight"));
    }
}
