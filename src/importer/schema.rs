// ==========================================
// CRM 导入管道 - Schema Registry
// ==========================================
// 职责: 每个导入目标的字段声明（名称、中文标签、别名、必填、类型）
// 与自然键规范化
// 红线: 只读静态数据，运行期不可修改
// ==========================================

use crate::domain::record::{FieldValue, NormalizedRecord};
use crate::domain::types::ImportTarget;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^09\d{8}$").expect("phone pattern is valid"));

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];
const TAG_SEPARATORS: [char; 6] = [',', ';', '|', '、', '，', '；'];

// ==========================================
// 字段类型
// ==========================================

/// 枚举字段的可选值（规范值 + 别名）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChoiceOption {
    pub value: &'static str,
    pub aliases: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text { max_len: usize },
    Phone,
    Email,
    Integer { min: Option<i64>, max: Option<i64> },
    Date,
    Boolean,
    Choice { options: &'static [ChoiceOption] },
    Tags,
}

impl FieldKind {
    /// 将已 TRIM 的非空原始值转换为类型化值
    ///
    /// # 返回
    /// - Ok(FieldValue): 转换成功
    /// - Err(String): 失败原因（写入 FieldError.message）
    pub fn coerce(&self, raw: &str) -> Result<FieldValue, String> {
        match self {
            FieldKind::Text { max_len } => {
                let len = raw.chars().count();
                if len > *max_len {
                    return Err(format!("长度 {} 超过上限 {}", len, max_len));
                }
                Ok(FieldValue::Text(raw.to_string()))
            }
            FieldKind::Phone => {
                let phone = normalize_phone(raw);
                if PHONE_RE.is_match(&phone) {
                    Ok(FieldValue::Text(phone))
                } else {
                    Err(format!("电话号码格式错误（应为 09 开头的 10 位数字）: {}", raw))
                }
            }
            FieldKind::Email => {
                if EMAIL_RE.is_match(raw) {
                    Ok(FieldValue::Text(raw.to_lowercase()))
                } else {
                    Err(format!("邮箱格式错误: {}", raw))
                }
            }
            FieldKind::Integer { min, max } => {
                let value = parse_integer(raw)?;
                if let Some(min) = min {
                    if value < *min {
                        return Err(format!("数值 {} 小于下限 {}", value, min));
                    }
                }
                if let Some(max) = max {
                    if value > *max {
                        return Err(format!("数值 {} 大于上限 {}", value, max));
                    }
                }
                Ok(FieldValue::Integer(value))
            }
            FieldKind::Date => parse_date(raw)
                .map(FieldValue::Date)
                .ok_or_else(|| format!("日期格式错误（支持 YYYY-MM-DD / YYYY/MM/DD / YYYYMMDD）: {}", raw)),
            FieldKind::Boolean => parse_bool(raw)
                .map(FieldValue::Boolean)
                .ok_or_else(|| format!("布尔值无法识别: {}", raw)),
            FieldKind::Choice { options } => {
                let lowered = raw.to_lowercase();
                options
                    .iter()
                    .find(|opt| {
                        opt.value == lowered
                            || opt.aliases.iter().any(|a| a.to_lowercase() == lowered)
                    })
                    .map(|opt| FieldValue::Text(opt.value.to_string()))
                    .ok_or_else(|| {
                        let allowed: Vec<&str> = options.iter().map(|o| o.value).collect();
                        format!("取值 {} 不在允许范围 [{}] 内", raw, allowed.join(", "))
                    })
            }
            FieldKind::Tags => Ok(FieldValue::List(split_tags(raw))),
        }
    }
}

// ==========================================
// 字段与目标 Schema
// ==========================================

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str, // 中文标签
    pub aliases: &'static [&'static str],
    pub required: bool,
    pub kind: FieldKind,
}

#[derive(Debug)]
pub struct TargetSchema {
    pub target: ImportTarget,
    pub key_field: &'static str, // 自然键字段
    pub fields: &'static [FieldSpec],
}

impl TargetSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    /// 取规范化记录的自然键
    pub fn key_of(&self, record: &NormalizedRecord) -> Option<String> {
        record
            .get_text(self.key_field)
            .map(|raw| canonical_key(self.target, raw))
    }
}

// ===== 客户 =====

const GENDER_OPTIONS: &[ChoiceOption] = &[
    ChoiceOption { value: "male", aliases: &["男", "m"] },
    ChoiceOption { value: "female", aliases: &["女", "f"] },
    ChoiceOption { value: "other", aliases: &["其他", "其它"] },
];

const CUSTOMER_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "name",
        label: "姓名",
        aliases: &["客户名称", "客户姓名", "customer name", "full name"],
        required: true,
        kind: FieldKind::Text { max_len: 100 },
    },
    FieldSpec {
        name: "phone",
        label: "电话",
        aliases: &["手机", "手机号", "联系电话", "mobile", "phone number", "tel"],
        required: true,
        kind: FieldKind::Phone,
    },
    FieldSpec {
        name: "email",
        label: "邮箱",
        aliases: &["电子邮件", "email address", "e-mail", "mail"],
        required: false,
        kind: FieldKind::Email,
    },
    FieldSpec {
        name: "gender",
        label: "性别",
        aliases: &["sex"],
        required: false,
        kind: FieldKind::Choice { options: GENDER_OPTIONS },
    },
    FieldSpec {
        name: "birthday",
        label: "生日",
        aliases: &["出生日期", "birth date", "date of birth", "dob"],
        required: false,
        kind: FieldKind::Date,
    },
    FieldSpec {
        name: "address",
        label: "地址",
        aliases: &["联系地址", "住址"],
        required: false,
        kind: FieldKind::Text { max_len: 255 },
    },
    FieldSpec {
        name: "tags",
        label: "标签",
        aliases: &["tag", "labels"],
        required: false,
        kind: FieldKind::Tags,
    },
    FieldSpec {
        name: "is_vip",
        label: "VIP",
        aliases: &["是否VIP", "vip客户"],
        required: false,
        kind: FieldKind::Boolean,
    },
    FieldSpec {
        name: "notes",
        label: "备注",
        aliases: &["note", "remark", "remarks", "comment"],
        required: false,
        kind: FieldKind::Text { max_len: 1000 },
    },
];

// ===== 订单 =====

const ORDER_STATUS_OPTIONS: &[ChoiceOption] = &[
    ChoiceOption { value: "pending", aliases: &["待处理", "待付款"] },
    ChoiceOption { value: "processing", aliases: &["处理中"] },
    ChoiceOption { value: "completed", aliases: &["已完成", "完成"] },
    ChoiceOption { value: "cancelled", aliases: &["已取消", "取消", "canceled"] },
];

const PAYMENT_OPTIONS: &[ChoiceOption] = &[
    ChoiceOption { value: "cash", aliases: &["现金"] },
    ChoiceOption { value: "credit_card", aliases: &["信用卡", "credit card"] },
    ChoiceOption { value: "bank_transfer", aliases: &["转账", "银行转账", "bank transfer"] },
    ChoiceOption { value: "other", aliases: &["其他", "其它"] },
];

const ORDER_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "order_number",
        label: "订单编号",
        aliases: &["订单号", "单号", "order no", "order id"],
        required: true,
        kind: FieldKind::Text { max_len: 64 },
    },
    FieldSpec {
        name: "customer_phone",
        label: "客户电话",
        aliases: &["客户手机", "customer mobile"],
        required: true,
        kind: FieldKind::Phone,
    },
    FieldSpec {
        name: "order_date",
        label: "订单日期",
        aliases: &["下单日期", "order time"],
        required: true,
        kind: FieldKind::Date,
    },
    FieldSpec {
        name: "total_amount",
        label: "订单金额",
        aliases: &["金额", "总金额", "amount", "total"],
        required: true,
        kind: FieldKind::Integer { min: Some(0), max: None },
    },
    FieldSpec {
        name: "quantity",
        label: "数量",
        aliases: &["qty", "件数"],
        required: false,
        kind: FieldKind::Integer { min: Some(1), max: None },
    },
    FieldSpec {
        name: "status",
        label: "订单状态",
        aliases: &["状态", "state"],
        required: false,
        kind: FieldKind::Choice { options: ORDER_STATUS_OPTIONS },
    },
    FieldSpec {
        name: "payment_method",
        label: "付款方式",
        aliases: &["支付方式", "payment"],
        required: false,
        kind: FieldKind::Choice { options: PAYMENT_OPTIONS },
    },
    FieldSpec {
        name: "notes",
        label: "备注",
        aliases: &["note", "remark", "remarks", "comment"],
        required: false,
        kind: FieldKind::Text { max_len: 1000 },
    },
];

static CUSTOMER_SCHEMA: TargetSchema = TargetSchema {
    target: ImportTarget::Customers,
    key_field: "phone",
    fields: CUSTOMER_FIELDS,
};

static ORDER_SCHEMA: TargetSchema = TargetSchema {
    target: ImportTarget::Orders,
    key_field: "order_number",
    fields: ORDER_FIELDS,
};

// ==========================================
// SchemaRegistry
// ==========================================
pub struct SchemaRegistry;

impl SchemaRegistry {
    pub fn schema_for(target: ImportTarget) -> &'static TargetSchema {
        match target {
            ImportTarget::Customers => &CUSTOMER_SCHEMA,
            ImportTarget::Orders => &ORDER_SCHEMA,
        }
    }
}

// ==========================================
// 规范化辅助函数
// ==========================================

/// 自然键规范化（电话取纯数字并还原 09 前缀；订单号 TRIM）
pub fn canonical_key(target: ImportTarget, raw: &str) -> String {
    match target {
        ImportTarget::Customers => normalize_phone(raw),
        ImportTarget::Orders => raw.trim().to_string(),
    }
}

/// 电话号码规范化: 只保留数字；+886/886 国际前缀与 Excel 吃掉的前导 0 还原为 09 开头
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() == 12 && digits.starts_with("8869") {
        return format!("0{}", &digits[3..]);
    }
    if digits.len() == 9 && digits.starts_with('9') {
        return format!("0{}", digits);
    }
    digits
}

fn parse_integer(raw: &str) -> Result<i64, String> {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(format!("不是整数: {}", raw));
    }

    if let Ok(n) = cleaned.parse::<i64>() {
        return Ok(n);
    }

    // 12.00 这类小数部分全为 0 的值视为整数
    if let Some((int_part, frac_part)) = cleaned.split_once('.') {
        let frac_is_zero = !frac_part.is_empty() && frac_part.chars().all(|c| c == '0');
        if frac_is_zero && !int_part.is_empty() && int_part != "-" && int_part != "+" {
            return int_part
                .parse::<i64>()
                .map_err(|_| format!("整数超出范围或格式错误: {}", raw));
        }
        return Err(format!("不是整数（含小数部分）: {}", raw));
    }

    Err(format!("整数超出范围或格式错误: {}", raw))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }

    // 带时间部分的日期（Excel 导出的 "2024-05-01 00:00:00"）
    if raw.len() > 10 {
        let date_part = raw.get(..10)?;
        let rest = raw.get(10..)?;
        if rest.starts_with(' ') || rest.starts_with('T') {
            return NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok();
        }
    }
    None
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "y" | "yes" | "true" | "是" => Some(true),
        "0" | "n" | "no" | "false" | "否" => Some(false),
        _ => None,
    }
}

fn split_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for part in raw.split(&TAG_SEPARATORS[..]) {
        let tag = part.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_normalization() {
        assert_eq!(FieldKind::Phone.coerce("0912-345-678"), Ok(FieldValue::Text("0912345678".into())));
        assert_eq!(FieldKind::Phone.coerce("+886 912 345 678"), Ok(FieldValue::Text("0912345678".into())));
        assert_eq!(FieldKind::Phone.coerce("912345678"), Ok(FieldValue::Text("0912345678".into())));
        assert!(FieldKind::Phone.coerce("12345").is_err());
        assert!(FieldKind::Phone.coerce("0812345678").is_err());
    }

    #[test]
    fn test_integer_never_truncates() {
        let kind = FieldKind::Integer { min: Some(0), max: None };
        assert_eq!(kind.coerce("1,200"), Ok(FieldValue::Integer(1200)));
        assert_eq!(kind.coerce("12.00"), Ok(FieldValue::Integer(12)));
        assert!(kind.coerce("12.5").is_err());
        assert!(kind.coerce("abc").is_err());
        assert!(kind.coerce("-1").is_err());
        assert!(kind.coerce("99999999999999999999").is_err());
    }

    #[test]
    fn test_date_formats() {
        let expected = FieldValue::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(FieldKind::Date.coerce("2024-05-01"), Ok(expected.clone()));
        assert_eq!(FieldKind::Date.coerce("2024/05/01"), Ok(expected.clone()));
        assert_eq!(FieldKind::Date.coerce("20240501"), Ok(expected.clone()));
        assert_eq!(FieldKind::Date.coerce("2024-05-01 00:00:00"), Ok(expected));
        assert!(FieldKind::Date.coerce("2024-13-01").is_err());
        assert!(FieldKind::Date.coerce("May 1").is_err());
    }

    #[test]
    fn test_choice_boolean_and_tags() {
        let gender = FieldKind::Choice { options: GENDER_OPTIONS };
        assert_eq!(gender.coerce("女"), Ok(FieldValue::Text("female".into())));
        assert_eq!(gender.coerce("Male"), Ok(FieldValue::Text("male".into())));
        assert!(gender.coerce("unknown").is_err());

        assert_eq!(FieldKind::Boolean.coerce("是"), Ok(FieldValue::Boolean(true)));
        assert_eq!(FieldKind::Boolean.coerce("N"), Ok(FieldValue::Boolean(false)));
        assert!(FieldKind::Boolean.coerce("maybe").is_err());

        assert_eq!(
            FieldKind::Tags.coerce("VIP, 回购;VIP | 新客"),
            Ok(FieldValue::List(vec!["VIP".into(), "回购".into(), "新客".into()]))
        );
    }

    #[test]
    fn test_text_and_email() {
        let text = FieldKind::Text { max_len: 3 };
        assert!(text.coerce("王小明").is_ok());
        assert!(text.coerce("王小明明").is_err());

        assert_eq!(FieldKind::Email.coerce("Amy@Example.com"), Ok(FieldValue::Text("amy@example.com".into())));
        assert!(FieldKind::Email.coerce("amy@").is_err());
    }

    #[test]
    fn test_registry_keys() {
        let customers = SchemaRegistry::schema_for(ImportTarget::Customers);
        assert_eq!(customers.key_field, "phone");
        assert_eq!(customers.required_fields().count(), 2);

        let orders = SchemaRegistry::schema_for(ImportTarget::Orders);
        assert_eq!(orders.key_field, "order_number");
        assert_eq!(orders.required_fields().count(), 4);

        assert_eq!(canonical_key(ImportTarget::Orders, "  SO-001 "), "SO-001");
        assert_eq!(canonical_key(ImportTarget::Customers, "0912 345 678"), "0912345678");
    }
}
