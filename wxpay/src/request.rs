//! Operation catalog and typed request builders

use crate::{fields, Error, Record, Result};
use std::fmt;

/// Sandbox path prefix
pub const SANDBOX_PREFIX: &str = "/sandboxnew";

/// Gateway operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Query an order
    OrderQuery,
    /// Close an unpaid order
    CloseOrder,
    /// Refund a paid order (mutual TLS)
    Refund,
    /// Create a prepay order
    UnifiedOrder,
    /// Charge a scanned payment code
    MicroPay,
    /// Timing telemetry
    Report,
    /// Sandbox signing key exchange
    SandboxSignKey,
}

/// Mandatory field rule
#[derive(Debug, Clone, Copy)]
pub enum Requirement {
    /// Field must be set
    Field(&'static str),
    /// At least one of the fields must be set
    AnyOf(&'static [&'static str]),
    /// `requires` must be set when `field` equals `equals`
    When {
        /// Discriminating field
        field: &'static str,
        /// Triggering value
        equals: &'static str,
        /// Field that becomes mandatory
        requires: &'static str,
    },
}

/// How a response signature is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCheck {
    /// A SUCCESS response must carry a valid signature
    Required,
    /// Verify only when a signature is present
    IfSigned,
    /// Not verified
    Skip,
}

const ORDER_ID: &[&str] = &[fields::OUT_TRADE_NO, fields::TRANSACTION_ID];

impl Operation {
    /// Short name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Operation::OrderQuery => "order_query",
            Operation::CloseOrder => "close_order",
            Operation::Refund => "refund",
            Operation::UnifiedOrder => "unified_order",
            Operation::MicroPay => "micropay",
            Operation::Report => "report",
            Operation::SandboxSignKey => "sandbox_sign_key",
        }
    }

    /// Endpoint path on the production host
    pub fn path(&self) -> &'static str {
        match self {
            Operation::OrderQuery => "/pay/orderquery",
            Operation::CloseOrder => "/pay/closeorder",
            Operation::Refund => "/secapi/pay/refund",
            Operation::UnifiedOrder => "/pay/unifiedorder",
            Operation::MicroPay => "/pay/micropay",
            Operation::Report => "/payitil/report",
            Operation::SandboxSignKey => "/sandboxnew/pay/getsignkey",
        }
    }

    /// Whether the operation has a sandbox twin
    pub fn has_sandbox(&self) -> bool {
        !matches!(self, Operation::Report | Operation::SandboxSignKey)
    }

    /// Whether round trips are followed by a timing report
    pub fn is_reported(&self) -> bool {
        !matches!(self, Operation::Report | Operation::SandboxSignKey)
    }

    /// Full endpoint URL
    pub fn url(&self, base_url: &str, sandbox: bool) -> String {
        let base = base_url.trim_end_matches('/');
        if sandbox && self.has_sandbox() {
            format!("{base}{SANDBOX_PREFIX}{}", self.path())
        } else {
            format!("{base}{}", self.path())
        }
    }

    /// Whether the gateway requires a client certificate
    pub fn requires_client_cert(&self) -> bool {
        matches!(self, Operation::Refund)
    }

    /// Whether `spbill_create_ip` is filled from settings
    pub fn fills_client_ip(&self) -> bool {
        matches!(self, Operation::UnifiedOrder | Operation::MicroPay)
    }

    /// Response signature policy
    pub fn response_check(&self) -> ResponseCheck {
        match self {
            Operation::Report => ResponseCheck::Skip,
            Operation::SandboxSignKey => ResponseCheck::IfSigned,
            _ => ResponseCheck::Required,
        }
    }

    /// Mandatory fields
    pub fn requirements(&self) -> &'static [Requirement] {
        use Requirement::*;
        match self {
            Operation::OrderQuery => &[AnyOf(ORDER_ID)],
            Operation::CloseOrder => &[Field(fields::OUT_TRADE_NO)],
            Operation::Refund => &[
                AnyOf(ORDER_ID),
                Field(fields::OUT_REFUND_NO),
                Field(fields::TOTAL_FEE),
                Field(fields::REFUND_FEE),
            ],
            Operation::UnifiedOrder => &[
                Field(fields::OUT_TRADE_NO),
                Field(fields::BODY),
                Field(fields::TOTAL_FEE),
                Field(fields::TRADE_TYPE),
                When {
                    field: fields::TRADE_TYPE,
                    equals: "JSAPI",
                    requires: fields::OPENID,
                },
                When {
                    field: fields::TRADE_TYPE,
                    equals: "NATIVE",
                    requires: fields::PRODUCT_ID,
                },
            ],
            Operation::MicroPay => &[
                Field(fields::BODY),
                Field(fields::OUT_TRADE_NO),
                Field(fields::TOTAL_FEE),
                Field(fields::AUTH_CODE),
            ],
            Operation::Report => &[
                Field(fields::INTERFACE_URL),
                Field(fields::RETURN_CODE),
                Field(fields::RESULT_CODE),
                Field(fields::USER_IP),
                Field(fields::EXECUTE_TIME),
            ],
            Operation::SandboxSignKey => &[Field(fields::MCH_ID)],
        }
    }

    /// Check mandatory fields, first failure wins
    pub fn validate(&self, record: &Record) -> Result<()> {
        for requirement in self.requirements() {
            match *requirement {
                Requirement::Field(field) if !record.is_set(field) => {
                    return Err(Error::MissingRequiredField(field.to_string()));
                }
                Requirement::AnyOf(any) if !any.iter().any(|f| record.is_set(f)) => {
                    return Err(Error::MissingRequiredField(any.join(" or ")));
                }
                Requirement::When {
                    field,
                    equals,
                    requires,
                } if record.get_str(field) == Some(equals) && !record.is_set(requires) => {
                    return Err(Error::MissingRequiredField(requires.to_string()));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Request bound to one operation
pub trait GatewayRequest {
    /// Operation this request is sent to
    const OPERATION: Operation;

    /// Underlying record
    fn record(&self) -> &Record;

    /// Underlying record, for fields without a dedicated setter
    fn record_mut(&mut self) -> &mut Record;

    /// Consume into the record
    fn into_record(self) -> Record;
}

macro_rules! gateway_request {
    (
        $(#[$meta:meta])*
        $name:ident => $op:expr;
        $( $(#[$fmeta:meta])* $setter:ident : $ty:ty => $key:expr ),* $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $name {
            record: Record,
        }

        impl $name {
            /// Create empty request
            pub fn new() -> Self {
                Self::default()
            }

            $(
                $(#[$fmeta])*
                pub fn $setter(mut self, value: $ty) -> Self {
                    self.record.set($key, value.to_string());
                    self
                }
            )*
        }

        impl GatewayRequest for $name {
            const OPERATION: Operation = $op;

            fn record(&self) -> &Record {
                &self.record
            }

            fn record_mut(&mut self) -> &mut Record {
                &mut self.record
            }

            fn into_record(self) -> Record {
                self.record
            }
        }

        impl From<Record> for $name {
            fn from(record: Record) -> Self {
                Self { record }
            }
        }
    };
}

gateway_request! {
    /// Order query; needs `out_trade_no` or `transaction_id`
    OrderQuery => Operation::OrderQuery;
    /// Public account / app ID (defaults to config)
    appid: &str => fields::APPID,
    /// Merchant ID (defaults to config)
    mch_id: &str => fields::MCH_ID,
    /// Sub-merchant app ID
    sub_appid: &str => fields::SUB_APPID,
    /// Sub-merchant ID
    sub_mch_id: &str => fields::SUB_MCH_ID,
    /// Gateway transaction ID
    transaction_id: &str => fields::TRANSACTION_ID,
    /// Merchant order number
    out_trade_no: &str => fields::OUT_TRADE_NO,
    /// Nonce (generated when unset)
    nonce_str: &str => fields::NONCE_STR,
}

gateway_request! {
    /// Close order; needs `out_trade_no`
    CloseOrder => Operation::CloseOrder;
    /// Public account / app ID (defaults to config)
    appid: &str => fields::APPID,
    /// Merchant ID (defaults to config)
    mch_id: &str => fields::MCH_ID,
    /// Sub-merchant ID
    sub_mch_id: &str => fields::SUB_MCH_ID,
    /// Merchant order number
    out_trade_no: &str => fields::OUT_TRADE_NO,
    /// Nonce (generated when unset)
    nonce_str: &str => fields::NONCE_STR,
}

gateway_request! {
    /// Refund; needs an order id, `out_refund_no`, `total_fee` and `refund_fee`
    Refund => Operation::Refund;
    /// Public account / app ID (defaults to config)
    appid: &str => fields::APPID,
    /// Merchant ID (defaults to config)
    mch_id: &str => fields::MCH_ID,
    /// Sub-merchant ID
    sub_mch_id: &str => fields::SUB_MCH_ID,
    /// Device info
    device_info: &str => fields::DEVICE_INFO,
    /// Gateway transaction ID
    transaction_id: &str => fields::TRANSACTION_ID,
    /// Merchant order number
    out_trade_no: &str => fields::OUT_TRADE_NO,
    /// Merchant refund number
    out_refund_no: &str => fields::OUT_REFUND_NO,
    /// Order total in fen
    total_fee: u64 => fields::TOTAL_FEE,
    /// Refund amount in fen
    refund_fee: u64 => fields::REFUND_FEE,
    /// Refund currency
    refund_fee_type: &str => fields::REFUND_FEE_TYPE,
    /// Operator ID
    op_user_id: &str => fields::OP_USER_ID,
    /// Nonce (generated when unset)
    nonce_str: &str => fields::NONCE_STR,
}

gateway_request! {
    /// Unified order; needs `out_trade_no`, `body`, `total_fee`, `trade_type`,
    /// plus `openid` for JSAPI and `product_id` for NATIVE
    UnifiedOrder => Operation::UnifiedOrder;
    /// Public account / app ID (defaults to config)
    appid: &str => fields::APPID,
    /// Merchant ID (defaults to config)
    mch_id: &str => fields::MCH_ID,
    /// Sub-merchant app ID
    sub_appid: &str => fields::SUB_APPID,
    /// Sub-merchant ID
    sub_mch_id: &str => fields::SUB_MCH_ID,
    /// Device info
    device_info: &str => fields::DEVICE_INFO,
    /// Product description
    body: &str => fields::BODY,
    /// Product detail
    detail: &str => fields::DETAIL,
    /// Merchant attachment, echoed in the callback
    attach: &str => fields::ATTACH,
    /// Merchant order number
    out_trade_no: &str => fields::OUT_TRADE_NO,
    /// Currency
    fee_type: &str => fields::FEE_TYPE,
    /// Order total in fen
    total_fee: u64 => fields::TOTAL_FEE,
    /// Payer IP (defaults to settings)
    spbill_create_ip: &str => fields::SPBILL_CREATE_IP,
    /// Start time, `YYYYmmddHHMMSS`
    time_start: &str => fields::TIME_START,
    /// Expiry time, `YYYYmmddHHMMSS`
    time_expire: &str => fields::TIME_EXPIRE,
    /// Goods tag
    goods_tag: &str => fields::GOODS_TAG,
    /// Callback URL (defaults to settings)
    notify_url: &str => fields::NOTIFY_URL,
    /// JSAPI, NATIVE, APP, ...
    trade_type: &str => fields::TRADE_TYPE,
    /// Product ID, required for NATIVE
    product_id: &str => fields::PRODUCT_ID,
    /// Payer open ID, required for JSAPI
    openid: &str => fields::OPENID,
    /// Payer open ID under the sub-merchant
    sub_openid: &str => fields::SUB_OPENID,
    /// Credit card restriction
    limit_pay: &str => fields::LIMIT_PAY,
    /// Nonce (generated when unset)
    nonce_str: &str => fields::NONCE_STR,
}

gateway_request! {
    /// Micropay; needs `body`, `out_trade_no`, `total_fee`, `auth_code`
    MicroPay => Operation::MicroPay;
    /// Public account / app ID (defaults to config)
    appid: &str => fields::APPID,
    /// Merchant ID (defaults to config)
    mch_id: &str => fields::MCH_ID,
    /// Sub-merchant ID
    sub_mch_id: &str => fields::SUB_MCH_ID,
    /// Device info
    device_info: &str => fields::DEVICE_INFO,
    /// Product description
    body: &str => fields::BODY,
    /// Product detail
    detail: &str => fields::DETAIL,
    /// Merchant attachment
    attach: &str => fields::ATTACH,
    /// Merchant order number
    out_trade_no: &str => fields::OUT_TRADE_NO,
    /// Order total in fen
    total_fee: u64 => fields::TOTAL_FEE,
    /// Currency
    fee_type: &str => fields::FEE_TYPE,
    /// Payer IP (defaults to settings)
    spbill_create_ip: &str => fields::SPBILL_CREATE_IP,
    /// Goods tag
    goods_tag: &str => fields::GOODS_TAG,
    /// Scanned payment code
    auth_code: &str => fields::AUTH_CODE,
    /// Nonce (generated when unset)
    nonce_str: &str => fields::NONCE_STR,
}

gateway_request! {
    /// Timing report
    Report => Operation::Report;
    /// Public account / app ID (defaults to config)
    appid: &str => fields::APPID,
    /// Merchant ID (defaults to config)
    mch_id: &str => fields::MCH_ID,
    /// Device info
    device_info: &str => fields::DEVICE_INFO,
    /// Reported interface URL
    interface_url: &str => fields::INTERFACE_URL,
    /// Execution time in ms
    execute_time: u128 => fields::EXECUTE_TIME,
    /// Reported return_code
    return_code: &str => fields::RETURN_CODE,
    /// Reported return_msg
    return_msg: &str => fields::RETURN_MSG,
    /// Reported result_code
    result_code: &str => fields::RESULT_CODE,
    /// Reported err_code
    err_code: &str => fields::ERR_CODE,
    /// Reported err_code_des
    err_code_des: &str => fields::ERR_CODE_DES,
    /// Reported order number
    out_trade_no: &str => fields::OUT_TRADE_NO,
    /// Reporting client IP
    user_ip: &str => fields::USER_IP,
    /// Report time, `YYYYmmddHHMMSS`
    time: &str => fields::TIME,
    /// Nonce (generated when unset)
    nonce_str: &str => fields::NONCE_STR,
}

gateway_request! {
    /// Sandbox signing key request
    SandboxSignKey => Operation::SandboxSignKey;
    /// Merchant ID
    mch_id: &str => fields::MCH_ID,
    /// Nonce
    nonce_str: &str => fields::NONCE_STR,
}
