//! Gateway field names

/// Public account / app ID
pub const APPID: &str = "appid";
/// Merchant ID
pub const MCH_ID: &str = "mch_id";
/// Sub-merchant app ID (service-provider mode)
pub const SUB_APPID: &str = "sub_appid";
/// Sub-merchant ID (service-provider mode)
pub const SUB_MCH_ID: &str = "sub_mch_id";
/// Random nonce
pub const NONCE_STR: &str = "nonce_str";
/// Signature
pub const SIGN: &str = "sign";
/// Signature algorithm
pub const SIGN_TYPE: &str = "sign_type";
/// Device info
pub const DEVICE_INFO: &str = "device_info";

/// Merchant order number
pub const OUT_TRADE_NO: &str = "out_trade_no";
/// Gateway transaction ID
pub const TRANSACTION_ID: &str = "transaction_id";
/// Merchant refund number
pub const OUT_REFUND_NO: &str = "out_refund_no";
/// Order total in fen
pub const TOTAL_FEE: &str = "total_fee";
/// Refund amount in fen
pub const REFUND_FEE: &str = "refund_fee";
/// Refund currency
pub const REFUND_FEE_TYPE: &str = "refund_fee_type";
/// Operator ID
pub const OP_USER_ID: &str = "op_user_id";
/// Currency
pub const FEE_TYPE: &str = "fee_type";
/// Product description
pub const BODY: &str = "body";
/// Product detail
pub const DETAIL: &str = "detail";
/// Merchant attachment
pub const ATTACH: &str = "attach";
/// Payer IP
pub const SPBILL_CREATE_IP: &str = "spbill_create_ip";
/// Order start time
pub const TIME_START: &str = "time_start";
/// Order expiry time
pub const TIME_EXPIRE: &str = "time_expire";
/// Goods tag
pub const GOODS_TAG: &str = "goods_tag";
/// Callback URL
pub const NOTIFY_URL: &str = "notify_url";
/// Trade type (JSAPI, NATIVE, APP, ...)
pub const TRADE_TYPE: &str = "trade_type";
/// Product ID (NATIVE)
pub const PRODUCT_ID: &str = "product_id";
/// Payer open ID (JSAPI)
pub const OPENID: &str = "openid";
/// Sub-merchant payer open ID
pub const SUB_OPENID: &str = "sub_openid";
/// Payment authorization code (micropay)
pub const AUTH_CODE: &str = "auth_code";
/// Credit card restriction
pub const LIMIT_PAY: &str = "limit_pay";

/// Communication-level status
pub const RETURN_CODE: &str = "return_code";
/// Communication-level message
pub const RETURN_MSG: &str = "return_msg";
/// Business-level status
pub const RESULT_CODE: &str = "result_code";
/// Business error code
pub const ERR_CODE: &str = "err_code";
/// Business error description
pub const ERR_CODE_DES: &str = "err_code_des";
/// Prepay session ID
pub const PREPAY_ID: &str = "prepay_id";
/// QR code URL (NATIVE)
pub const CODE_URL: &str = "code_url";
/// Sandbox signing key
pub const SANDBOX_SIGNKEY: &str = "sandbox_signkey";

/// Reported interface URL
pub const INTERFACE_URL: &str = "interface_url";
/// Reported execution time (ms)
pub const EXECUTE_TIME: &str = "execute_time_";
/// Reporting client IP
pub const USER_IP: &str = "user_ip";
/// Report time (YYYYmmddHHMMSS)
pub const TIME: &str = "time";

/// Status value for success
pub const SUCCESS: &str = "SUCCESS";
/// Status value for failure
pub const FAIL: &str = "FAIL";
