use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use super::content::Pagination;

/// 解包 `{success, data}` 信封：带 success 标记且 data 非空时返回 data，否则原样返回
pub fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("success") => match map.remove("data") {
            Some(data) if !data.is_null() => data,
            Some(data) => {
                map.insert("data".to_string(), data);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}

pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| AppError::MalformedResponse(e.to_string()))
}

/// Spring 风格分页响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub total_elements: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

impl<T> Page<T> {
    pub fn pagination(&self, requested_page: u32, requested_size: u32) -> Pagination {
        Pagination {
            page: self.number.unwrap_or(requested_page),
            size: self.size.unwrap_or(requested_size),
            total: self.total_elements.unwrap_or(0),
            total_pages: self.total_pages.unwrap_or(0),
        }
    }
}

/// 列表接口的两种返回形态：分页信封为标准形态，纯数组仅作兼容
#[derive(Debug, Clone)]
pub enum ListShape<T> {
    Paged(Page<T>),
    Flat(Vec<T>),
}

impl<T: DeserializeOwned> ListShape<T> {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(_) => Ok(ListShape::Flat(decode(value)?)),
            Value::Object(ref map) if map.contains_key("content") => {
                Ok(ListShape::Paged(decode(value)?))
            }
            Value::Null => Ok(ListShape::Flat(Vec::new())),
            other => Err(AppError::MalformedResponse(format!(
                "expected a page or a list, got: {}",
                other
            ))),
        }
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            ListShape::Paged(page) => page.content,
            ListShape::Flat(items) => items,
        }
    }
}

impl<T> ListShape<T> {
    /// 转为列表和分页信息；纯数组没有分页信息
    pub fn into_listing(self, requested_page: u32, requested_size: u32) -> Listing<T> {
        match self {
            ListShape::Paged(page) => {
                let pagination = page.pagination(requested_page, requested_size);
                Listing {
                    items: page.content,
                    pagination: Some(pagination),
                }
            }
            ListShape::Flat(items) => Listing {
                items,
                pagination: None,
            },
        }
    }
}

/// 一页数据
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub pagination: Option<Pagination>,
}
