pub(crate) mod http;

pub(crate) use self::http::{
    client_address, http_method, http_route, http_url_scheme, http_version, route_name,
};
