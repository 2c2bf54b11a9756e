mod domain {
    mod parser_tests;
    mod search_tests;
}

mod form {
    mod builder_tests;
    mod table_tests;
}

mod script {
    mod runtime_tests;
    mod scope_tests;
}
